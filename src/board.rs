//! Board bring-up (§4.5, ambient/external-collaborator glue).
//!
//! This is the one module allowed to name chip-specific details: GPIO base
//! addresses, the diagnostic UART, and the USB device descriptor. It wires
//! those concrete pieces into the HAL traits and the Dispatcher, then hands
//! off to the forever-loop. A real port of this firmware edits only this
//! file (and, if its GPIO peripheral doesn't fit the direction/output/input
//! triad `hal::mcu_gpio::Port` assumes, supplies its own `GpioByte` impl).

use embedded_hal::delay::DelayNs;
use usb_device::bus::UsbBus;
use usb_device::device::{StringDescriptors, UsbDeviceBuilder, UsbVidPid};
use usbd_serial::SerialPort;

use crate::dispatcher::Dispatcher;
use crate::hal::mcu_gpio::Port;
use crate::logger::{self, DiagWriter};
use crate::port::PortDriver;
use crate::usb::UsbCdcLink;

/// Base addresses of the four GPIO port triads wired to the parallel-port
/// bus. Placeholder values: a real board substitutes its own memory map.
const DATA_PORT_BASE: usize = 0x4001_0800;
const STATUS_PORT_BASE: usize = 0x4001_0c00;
const CONTROL_PORT_BASE: usize = 0x4001_1000;
const LED_PORT_BASE: usize = 0x4001_1400;

/// Vendor/product ID pair for USB enumeration. Placeholder: a shipped board
/// uses an ID it is licensed to present.
const USB_VID: u16 = 0x1209;
const USB_PID: u16 = 0x0001;

/// Assembles the four `Port` GPIO groups from their fixed base addresses.
///
/// # Safety
///
/// Must be called at most once; the returned `Port` values each assume
/// exclusive ownership of their base address for the life of the program.
unsafe fn gpio_groups() -> (Port, Port, Port, Port) {
    unsafe {
        (
            Port::new(DATA_PORT_BASE),
            Port::new(STATUS_PORT_BASE),
            Port::new(CONTROL_PORT_BASE),
            Port::new(LED_PORT_BASE),
        )
    }
}

/// Builds the USB-CDC device and serial class around a board-supplied bus
/// allocator, with the device descriptor this firmware presents to the
/// host.
fn build_usb_link<'a, B: UsbBus>(
    bus: &'a usb_device::bus::UsbBusAllocator<B>,
) -> UsbCdcLink<'a, B> {
    let serial = SerialPort::new(bus);
    let device = UsbDeviceBuilder::new(bus, UsbVidPid(USB_VID, USB_PID))
        .strings(&[StringDescriptors::default()
            .manufacturer("SWC Bridge Contributors")
            .product("SWC USB Bridge")
            .serial_number("0")])
        .expect("device descriptor strings are valid UTF-8")
        .device_class(usbd_serial::USB_CLASS_CDC)
        .build();
    UsbCdcLink::new(device, serial)
}

/// Entry point called by `main` once early clock/watchdog bring-up has
/// happened. Constructs the concrete HAL bindings, builds the Dispatcher,
/// and runs it forever. `diag` is the diagnostic logging sink (a UART or
/// semihosting channel, never the USB-CDC link); `usb_bus` is a
/// board-allocated `UsbBusAllocator` for whatever USB peripheral the target
/// exposes; `delay` provides the SRAM-read inter-block delay.
pub fn run<B, DL>(
    diag: &'static mut dyn DiagWriter,
    usb_bus: &'static usb_device::bus::UsbBusAllocator<B>,
    delay: DL,
) -> !
where
    B: UsbBus,
    DL: DelayNs,
{
    logger::init(diag);
    log::info!("swc-bridge-fw starting");

    let (data, status, control, led) = unsafe { gpio_groups() };
    let port = PortDriver::new(data, status, control, led);
    let host = build_usb_link(usb_bus);

    let mut dispatcher = Dispatcher::new(port, host, delay);
    log::info!("dispatcher ready, entering command loop");
    dispatcher.run()
}

//! Binary entry point: reset bring-up for one reference target (an
//! STM32F103 "blue pill"-class board), wired through `cortex-m-rt`. Every
//! line here is target-specific glue (§4.5); the core protocol stack this
//! calls into knows nothing about any of it.

#![no_std]
#![no_main]

use core::fmt::Write as _;

use cortex_m::delay::Delay;
use cortex_m_rt::entry;
use cortex_m_semihosting::hio;
use stm32f1xx_hal::prelude::*;
use stm32f1xx_hal::usb::{Peripheral, UsbBus};
use usb_device::bus::UsbBusAllocator;

use swc_bridge_fw::board;
use swc_bridge_fw::logger::DiagWriter;

/// Diagnostic sink over the host debugger's semihosting channel, used when
/// the board has no second UART free for logging independent of the USB-CDC
/// link (§4.6).
struct SemihostingWriter(hio::HostStream);

impl core::fmt::Write for SemihostingWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

static mut DIAG: Option<SemihostingWriter> = None;
static mut USB_BUS: Option<UsbBusAllocator<UsbBus<Peripheral>>> = None;

#[entry]
fn main() -> ! {
    let core = cortex_m::Peripherals::take().unwrap();
    let device = stm32f1xx_hal::pac::Peripherals::take().unwrap();

    let mut flash = device.FLASH.constrain();
    let rcc = device.RCC.constrain();
    let clocks = rcc
        .cfgr
        .use_hse(8.MHz())
        .sysclk(72.MHz())
        .pclk1(36.MHz())
        .freeze(&mut flash.acr);

    let mut gpioa = device.GPIOA.split();
    // USB re-enumeration: pull D+ low briefly on reset so the host notices
    // the device went away, then hand the pin to the USB peripheral.
    let mut usb_dp = gpioa.pa12.into_push_pull_output(&mut gpioa.crh);
    usb_dp.set_low();
    cortex_m::asm::delay(clocks.sysclk().raw() / 100);

    let usb_peripheral = Peripheral {
        usb: device.USB,
        pin_dm: gpioa.pa11,
        pin_dp: usb_dp.into_floating_input(&mut gpioa.crh),
    };

    // Safety: written exactly once, before `board::run` ever reads it, and
    // never mutated again for the remaining life of the program.
    unsafe {
        USB_BUS = Some(UsbBus::new(usb_peripheral));
        DIAG = Some(SemihostingWriter(
            hio::hstdout().unwrap_or_else(|_| panic!("no semihosting channel available")),
        ));

        let usb_bus = USB_BUS.as_ref().unwrap();
        let diag: &'static mut dyn DiagWriter = DIAG.as_mut().unwrap();
        let delay = Delay::new(core.SYST, clocks.sysclk().raw());

        board::run(diag, usb_bus, delay)
    }
}

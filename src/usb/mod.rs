//! Reference `HostLink` binding over a USB-CDC virtual serial port (§4.0,
//! §6), built on `usb-device` + `usbd-serial`.

use heapless::Deque;
use usb_device::bus::UsbBus;
use usb_device::device::UsbDevice;
use usb_device::UsbError;
use usbd_serial::SerialPort;

use crate::hal::HostLink;

/// Local receive buffer between the USB ISR/poll path and `receive_byte`.
/// Sized well past one command token plus the largest single poll's worth
/// of block payload the CDC driver hands back in one read.
const RX_BUF: usize = 256;

/// CDC-ACM virtual serial endpoint, adapted to `HostLink`.
pub struct UsbCdcLink<'a, B: UsbBus> {
    device: UsbDevice<'a, B>,
    serial: SerialPort<'a, B>,
    rx: Deque<u8, RX_BUF>,
}

impl<'a, B: UsbBus> UsbCdcLink<'a, B> {
    pub fn new(device: UsbDevice<'a, B>, serial: SerialPort<'a, B>) -> Self {
        Self {
            device,
            serial,
            rx: Deque::new(),
        }
    }

    /// Drains whatever the CDC driver currently has buffered into `rx`,
    /// dropping bytes only if `rx` is already full.
    fn fill_rx(&mut self) {
        let mut chunk = [0u8; 64];
        match self.serial.read(&mut chunk) {
            Ok(count) => {
                for &b in &chunk[..count] {
                    if self.rx.push_back(b).is_err() {
                        break;
                    }
                }
            }
            Err(UsbError::WouldBlock) => {}
            Err(_) => {}
        }
    }
}

impl<'a, B: UsbBus> HostLink for UsbCdcLink<'a, B> {
    fn receive_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            self.fill_rx();
        }
        self.rx.pop_front()
    }

    fn bytes_received(&self) -> usize {
        self.rx.len()
    }

    fn send_data(&mut self, buf: &[u8]) {
        let mut written = 0;
        while written < buf.len() {
            match self.serial.write(&buf[written..]) {
                Ok(count) => written += count,
                Err(_) => {
                    self.task_pump();
                }
            }
        }
    }

    fn flush(&mut self) {
        while self.serial.flush().is_err() {
            self.task_pump();
        }
    }

    fn task_pump(&mut self) {
        self.device.poll(&mut [&mut self.serial]);
        self.fill_rx();
    }
}

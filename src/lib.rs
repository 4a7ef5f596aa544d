//! Firmware bridging a USB-CDC virtual serial port to a Super Wild Card
//! cartridge copier's parallel-port interface (§1).
//!
//! The core protocol stack (`port`, `handshake`, `protocol`, `dispatcher`)
//! is hardware-agnostic, generic over the `hal::GpioByte`/`hal::HostLink`
//! traits, and unit-tested on the host target. `board` supplies the one
//! concrete binding this firmware ships and owns every chip-specific detail.

#![no_std]
#![allow(clippy::too_many_arguments)]

pub mod board;
pub mod dispatcher;
pub mod fault;
pub mod hal;
pub mod handshake;
pub mod logger;
pub mod port;
pub mod protocol;
pub mod usb;

use core::panic::PanicInfo;

/// Platform-mandated backstop for states the rest of the firmware never
/// reaches in normal operation (§4.7). Every expected failure mode —
/// timeout, checksum mismatch, unknown command — is a typed `Result`/count
/// handled by its caller; this only fires on a genuine programming error.
///
/// Gated out under `cfg(test)` so host unit tests link against `std`'s own
/// panic runtime instead (the two handlers cannot coexist).
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(location) = info.location() {
        log::error!(
            "PANIC at {}:{}: {}",
            location.file(),
            location.line(),
            info.message()
        );
    } else {
        log::error!("PANIC: {}", info.message());
    }

    loop {
        cortex_m::asm::bkpt();
    }
}

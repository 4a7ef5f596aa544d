//! Reference `GpioByte` binding for a generic memory-mapped microcontroller
//! GPIO port.
//!
//! Models the direction/output/input register triad (AVR's `DDRx`/`PORTx`/
//! `PINx`) as three adjacent byte registers at a board-supplied base address,
//! using `tock-registers` the way the AHCI/EHCI register blocks in this
//! lineage define memory-mapped peripheral layouts. A real board retargets
//! this by supplying its own base address (or, for a GPIO peripheral that
//! doesn't fit this triad, by implementing `GpioByte` directly instead of
//! going through this module).

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite};

use crate::hal::GpioByte;

/// Direction/output/input triad for one byte-wide GPIO port.
#[repr(C)]
pub struct PortRegisters {
    /// Direction register: bit = 1 selects output, 0 selects input.
    pub direction: ReadWrite<u8>,
    /// Output register (output bits) / pull-up enable register (input bits).
    pub output: ReadWrite<u8>,
    /// Input register: instantaneous pin level, any direction.
    pub input: ReadOnly<u8>,
}

/// One `GpioByte` port backed by a `PortRegisters` block at a fixed
/// memory address.
///
/// # Safety
///
/// `base` must point at a valid, exclusively-owned `PortRegisters` block for
/// the lifetime of the `Port` value.
pub struct Port {
    regs: *const PortRegisters,
}

impl Port {
    /// # Safety
    ///
    /// `base` must be the address of a real `PortRegisters` block, and no
    /// other code may access it concurrently.
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            regs: base as *const PortRegisters,
        }
    }

    fn regs(&self) -> &PortRegisters {
        unsafe { &*self.regs }
    }
}

impl GpioByte for Port {
    fn set_direction(&mut self, output_mask: u8) {
        self.regs().direction.set(output_mask);
    }

    fn write(&mut self, value: u8) {
        self.regs().output.set(value);
    }

    fn read(&self) -> u8 {
        self.regs().input.get()
    }
}

// Safety: the firmware is single-threaded; `Port` is only ever touched from
// the one dispatcher loop.
unsafe impl Send for Port {}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use core::cell::Cell;

    /// In-memory stand-in for a real `PortRegisters` block, used by unit
    /// tests in `port`, `handshake`, and `protocol`.
    #[derive(Default)]
    pub struct FakeGpio {
        pub direction: Cell<u8>,
        pub output: Cell<u8>,
        pub input: Cell<u8>,
        /// Counts `write` calls, so tests can assert a no-op performed no
        /// side effect at all rather than just an unchanged value.
        pub write_calls: Cell<u32>,
    }

    impl FakeGpio {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl GpioByte for FakeGpio {
        fn set_direction(&mut self, output_mask: u8) {
            self.direction.set(output_mask);
        }

        fn write(&mut self, value: u8) {
            self.output.set(value);
            self.write_calls.set(self.write_calls.get() + 1);
        }

        fn read(&self) -> u8 {
            self.input.get()
        }
    }
}

//! Port Driver (§4.1): the four GPIO groups that make up the parallel-port
//! bus, and the peripheral-facing polarity masks that convert raw pin levels
//! to the logical signals the rest of the firmware reasons about.

use crate::hal::GpioByte;

/// Data lines drive the full byte; all 8 are output while active.
const DATA_OUTPUT_MASK: u8 = 0xFF;

/// Status lines are all input while active; `0xFF` on the write side just
/// enables pull-ups.
const STATUS_PULLUPS: u8 = 0xFF;

/// Control lines occupy the high nibble of the control port; all 4 are
/// output while active.
const CONTROL_OUTPUT_MASK: u8 = 0xF0;

/// LED is a single output bit.
const LED_OUTPUT_MASK: u8 = 0x01;
const LED_ON: u8 = 0x01;

/// XOR mask applied to the logical control nibble before it is shifted into
/// the high nibble of the control port (and the inverse operation on read).
/// Peripheral-facing; must be preserved bit-exact (§9).
const CONTROL_XOR_MASK: u8 = 0b1011;

/// STROBE is bit 0 of the logical (post-XOR) control nibble.
const STROBE_BIT: u8 = 0x01;

/// Busy-bit polarity fixup: the raw status register reads busy active-low;
/// XORing this bit yields "busy = 1 means the peripheral is busy".
pub const BUSY_XOR_BIT: u8 = 0x80;

/// Low-nibble receive mask on the status port, bits {3..6}.
pub const NIBBLE_INPUT_MASK: u8 = 0x78;

/// Four GPIO groups wired to the parallel-port bus, plus their shared
/// polarity fixups.
pub struct PortDriver<D, S, C, L>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
{
    data: D,
    status: S,
    control: C,
    led: L,
    led_state: bool,
}

impl<D, S, C, L> PortDriver<D, S, C, L>
where
    D: GpioByte,
    S: GpioByte,
    C: GpioByte,
    L: GpioByte,
{
    pub fn new(data: D, status: S, control: C, led: L) -> Self {
        Self {
            data,
            status,
            control,
            led,
            led_state: false,
        }
    }

    /// Configure all four groups for an in-flight operation: data out,
    /// status in with pull-ups, control out, LED out-and-on.
    pub fn activate(&mut self) {
        self.data.set_direction(DATA_OUTPUT_MASK);
        self.data.write(0);

        self.status.set_direction(0x00);
        self.status.write(STATUS_PULLUPS);

        self.control.set_direction(CONTROL_OUTPUT_MASK);
        self.control.write(0);

        self.led.set_direction(LED_OUTPUT_MASK);
        self.led.write(LED_ON);
        self.led_state = true;
    }

    /// Release the bus: every group reverts to input, pull-ups off, outputs
    /// low, LED off. The external bus must be undriven outside the
    /// activate/deactivate window (§3).
    pub fn deactivate(&mut self) {
        self.data.set_direction(0x00);
        self.data.write(0);

        self.status.set_direction(0x00);
        self.status.write(0);

        self.control.set_direction(0x00);
        self.control.write(0);

        self.led.set_direction(0x00);
        self.led.write(0);
        self.led_state = false;
    }

    pub fn write_data(&mut self, byte: u8) {
        self.data.write(byte);
    }

    /// Writes the logical control nibble (bit 0 = STROBE) through the XOR
    /// polarity mask into the high nibble of the control port.
    pub fn write_control(&mut self, byte: u8) {
        self.control.write((byte ^ CONTROL_XOR_MASK) << 4);
    }

    /// Reads back the logical control nibble (inverse of `write_control`).
    pub fn read_control(&self) -> u8 {
        (self.control.read() >> 4) ^ CONTROL_XOR_MASK
    }

    /// Reads the status port with busy polarity normalized so that
    /// "busy = 1" means the peripheral is busy.
    pub fn read_status(&self) -> u8 {
        self.status.read() ^ BUSY_XOR_BIT
    }

    pub fn flip_led(&mut self) {
        self.led_state = !self.led_state;
        self.led.write(self.led_state as u8);
    }

    /// Toggles STROBE and the LED together; atomic from the consumer's
    /// viewpoint (§4.1).
    pub fn invert_strobe(&mut self) {
        let control = self.read_control() ^ STROBE_BIT;
        self.write_control(control);
        self.flip_led();
    }

    #[cfg(test)]
    pub(crate) fn data_gpio(&self) -> &D {
        &self.data
    }

    #[cfg(test)]
    pub(crate) fn control_gpio(&self) -> &C {
        &self.control
    }

    #[cfg(test)]
    pub(crate) fn status_gpio(&self) -> &S {
        &self.status
    }
}

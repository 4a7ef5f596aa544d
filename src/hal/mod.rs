//! Hardware abstraction seams (§4.0, §6).
//!
//! `GpioByte` and `HostLink` are the only two interfaces the core crate
//! depends on for hardware access. Everything chip- or board-specific lives
//! behind a concrete implementation of these traits, constructed in
//! `board.rs`.

pub mod mcu_gpio;

/// One byte-wide bidirectional GPIO group: the classic direction/drive/read
/// register triad (AVR calls these DDRx/PORTx/PINx), generalized across
/// microcontroller families.
pub trait GpioByte {
    /// Bits set to 1 drive their pin as an output; bits set to 0 leave the
    /// pin as an input.
    fn set_direction(&mut self, output_mask: u8);

    /// For output bits, drives the pin high/low; for input bits, a 1 enables
    /// that pin's pull-up.
    fn write(&mut self, value: u8);

    /// Samples the current electrical level of all 8 lines, regardless of
    /// configured direction.
    fn read(&self) -> u8;
}

/// The USB-CDC virtual-serial endpoint (§6). Byte-oriented, non-blocking,
/// with an explicit has-bytes query instead of a signed sentinel.
pub trait HostLink {
    /// Pops and returns the next buffered byte, or `None` if the endpoint's
    /// receive buffer is currently empty. `Option`, not a signed `-1`
    /// sentinel, so emptiness can never be confused with a valid byte value.
    fn receive_byte(&mut self) -> Option<u8>;

    /// Number of bytes currently buffered and ready for `receive_byte`.
    fn bytes_received(&self) -> usize;

    /// Queues `buf` for transmission to the host.
    fn send_data(&mut self, buf: &[u8]);

    /// Hands any queued output to the USB stack; cooperatively pumps until
    /// done.
    fn flush(&mut self);

    /// Advances the USB device stack by one step. The only suspension point
    /// in the firmware; never blocks.
    fn task_pump(&mut self);

    /// Reads exactly `buf.len()` bytes from the host, pumping the USB task
    /// between polls. Blocks (cooperatively) until satisfied — callers only
    /// use this at iteration boundaries where that is the intended behavior
    /// (§7, "Host transport framing").
    fn receive_exact(&mut self, buf: &mut [u8]) {
        let mut filled = 0;
        while filled < buf.len() {
            if let Some(byte) = self.receive_byte() {
                buf[filled] = byte;
                filled += 1;
            }
            self.task_pump();
        }
    }
}

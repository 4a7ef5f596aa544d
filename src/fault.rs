//! The process-wide fault latch (see §3, §4.7, §9 of the design notes).
//!
//! `wait_busy_bit` is the only primitive that sets it; the Command Dispatcher
//! is the only owner that clears it, once per iteration, after reporting
//! `TIMEOUT\n`.

use core::cell::Cell;

/// Marker error returned by Handshake/Packet primitives once the fault latch
/// is set. Callers propagate it with `?`; there is no payload because the
/// latch itself (not the error value) carries the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

/// Latched "a busy-wait exceeded POLL_MAX" bit, shared by reference down an
/// operation's call tree for the duration of one dispatcher iteration.
pub struct Fault(Cell<bool>);

impl Fault {
    pub const fn new() -> Self {
        Self(Cell::new(false))
    }

    pub fn is_set(&self) -> bool {
        self.0.get()
    }

    pub fn set(&self) {
        self.0.set(true);
    }

    pub fn clear(&self) {
        self.0.set(false);
    }

    /// Every Handshake/Packet primitive starts with this: if the latch is
    /// already set, the call is a no-op (§3 invariant).
    pub fn check(&self) -> Result<(), Timeout> {
        if self.0.get() {
            Err(Timeout)
        } else {
            Ok(())
        }
    }
}

impl Default for Fault {
    fn default() -> Self {
        Self::new()
    }
}

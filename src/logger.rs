//! Logging infrastructure (§4.6).
//!
//! A single `log`-crate sink, combined-console style but trimmed to the one
//! diagnostic channel this target has: there is no framebuffer or CBMEM
//! console here, so records go to whatever
//! `core::fmt::Write` sink `board.rs` installs (a diagnostic UART, or a
//! semihosting channel on targets without a second UART) — never to the
//! USB-CDC link, which carries the position-sensitive command protocol.

use core::fmt::Write;

use log::{LevelFilter, Metadata, Record};
use spin::Mutex;

/// Bound on the `DiagWriter` trait object stored behind the mutex.
pub trait DiagWriter: Write + Send {}
impl<T: Write + Send> DiagWriter for T {}

static SINK: Mutex<Option<&'static mut dyn DiagWriter>> = Mutex::new(None);

struct DiagLogger;

impl log::Log for DiagLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level_str = match record.level() {
            log::Level::Error => "ERROR",
            log::Level::Warn => "WARN ",
            log::Level::Info => "INFO ",
            log::Level::Debug => "DEBUG",
            log::Level::Trace => "TRACE",
        };
        if let Some(writer) = SINK.lock().as_mut() {
            let _ = writeln!(writer, "[{}] {}", level_str, record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: DiagLogger = DiagLogger;

/// Installs `writer` as the diagnostic sink and registers the `log` facade.
/// Must be called exactly once, from `board::run` before any other
/// component logs. `writer` is `'static` because it outlives the device's
/// forever-loop.
pub fn init(writer: &'static mut dyn DiagWriter) {
    *SINK.lock() = Some(writer);
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(LevelFilter::Info))
        .ok();
}

/// Raises or lowers the active log level. `Debug` traces each Packet
/// Protocol operation; `Trace` additionally traces individual
/// `send_byte`/`receive_byte` calls and poll-counter values (§4.6).
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

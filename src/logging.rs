//! Adapts the `log` crate onto [`crate::console::ConsoleBackend`], so
//! `log::debug!`/`log::warn!`/etc. calls sprinkled through this crate
//! reach the same character sink `putch`-based output does, instead of
//! needing their own formatting path.

use core::fmt::Write;

use log::{Level, Log, Metadata, Record};

use crate::console::ConsoleBackend;

/// A `core::fmt::Write` sink that pushes every byte through
/// [`ConsoleBackend::putch`] rather than buffering, since this crate has
/// no heap to grow a `String` in.
struct ConsoleWriter<'a>(&'a dyn ConsoleBackend);

impl Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for b in s.bytes() {
            self.0.putch(b);
        }
        Ok(())
    }
}

pub struct ConsoleLogger {
    console: &'static dyn ConsoleBackend,
    level: Level,
}

impl ConsoleLogger {
    pub const fn new(console: &'static dyn ConsoleBackend, level: Level) -> Self {
        ConsoleLogger { console, level }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut w = ConsoleWriter(self.console);
        let _ = writeln!(w, "[{}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

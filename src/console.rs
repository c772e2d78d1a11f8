//! Boot console and logger.
//!
//! The loader has exactly one output: a platform [`Backend`] that can put a
//! character. [`BootConsole`] owns it behind a spinlock, serves as the `log`
//! facade's logger, and provides the single fatal path that ends the boot.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::mm::{MappingError, Region, SectionTable};

/// Platform hooks the loader needs from the board it runs on.
pub trait Backend: Send {
    /// Bring the device up. Called once, before anything is printed.
    fn init(&mut self);

    /// Emit one byte.
    fn put_char(&mut self, c: u8);

    /// Identity map the console registers into `table` so output keeps
    /// working once translation is on. Returns the mapped region.
    fn map_console(&mut self, table: &mut SectionTable) -> Result<Region, MappingError>;

    /// Stop the processor for good.
    fn halt(&mut self) -> !;
}

/// `fmt::Write` adapter turning `\n` into `\r\n`.
struct Writer<'b, B: Backend>(&'b mut B);

impl<B: Backend> Write for Writer<'_, B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.0.put_char(b'\r');
            }
            self.0.put_char(byte);
        }
        Ok(())
    }
}

pub struct BootConsole<B> {
    backend: Mutex<B>,
    max_level: LevelFilter,
}

impl<B: Backend> BootConsole<B> {
    pub const fn new(backend: B, max_level: LevelFilter) -> Self {
        Self {
            backend: Mutex::new(backend),
            max_level,
        }
    }

    /// Initialize the backend and register as the global logger.
    pub fn install(&'static self)
    where
        B: 'static,
    {
        self.backend.lock().init();
        // Only fails if a logger is already set, in which case that one
        // stays in charge.
        if log::set_logger(self).is_ok() {
            log::set_max_level(self.max_level);
        }
    }

    /// Write `s` verbatim (apart from line endings).
    pub fn puts(&self, s: &str) {
        let mut backend = self.backend.lock();
        let _ = Writer(&mut *backend).write_str(s);
    }

    pub fn map_console(&self, table: &mut SectionTable) -> Result<Region, MappingError> {
        self.backend.lock().map_console(table)
    }

    /// Announce `reason` and halt.
    pub fn fatal(&self, reason: fmt::Arguments<'_>) -> ! {
        let mut backend = match self.backend.try_lock() {
            Some(guard) => guard,
            None => {
                // SAFETY: Boot is single threaded; the lock can only be held
                // here if a fault interrupted a print, and that print will
                // never resume.
                unsafe { self.backend.force_unlock() };
                self.backend.lock()
            }
        };
        let mut out = Writer(&mut *backend);
        let _ = out.write_str("panic!\n");
        let _ = out.write_fmt(reason);
        let _ = out.write_str("\nMay the next time be better!\n");
        backend.halt()
    }
}

impl<B: Backend> Log for BootConsole<B> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut backend = self.backend.lock();
        let _ = writeln!(
            Writer(&mut *backend),
            "[{} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

//! Kernel Logging
//!
//! Backend for the `log` facade. Every record is written to the diagnostic
//! console the kernel installs at boot, one line per record:
//!
//! ```text
//! [KERNEL] INFO  Created process: shell (PID: 2)
//! ```
//!
//! Records emitted before [`init`] are dropped.

#![warn(clippy::undocumented_unsafe_blocks)]

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};
use spin::Once;

use crate::{KernelError, KernelResult};

/// Byte sink for diagnostic output
pub trait Console: Sync {
    /// Write `text` verbatim
    fn write_str(&self, text: &str);
}

/// `log` backend writing to a [`Console`]
pub struct KernelLogger {
    console: Once<&'static dyn Console>,
}

impl KernelLogger {
    const fn new() -> Self {
        Self { console: Once::new() }
    }
}

struct ConsoleWriter<'a>(&'a dyn Console);

impl Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = self.console.get() {
            let _ = write_record(&mut ConsoleWriter(*console), record);
        }
    }

    fn flush(&self) {}
}

fn write_record(out: &mut impl Write, record: &Record) -> fmt::Result {
    writeln!(out, "[KERNEL] {:<5} {}", record.level(), record.args())
}

static LOGGER: KernelLogger = KernelLogger::new();

/// Install the kernel logger on `console` and set the maximum level
///
/// Fails with [`KernelError::LoggerInstalled`] if a logger is already set.
pub fn init(console: &'static dyn Console, level: LevelFilter) -> KernelResult<()> {
    LOGGER.console.call_once(|| console);
    log::set_logger(&LOGGER).map_err(|_| KernelError::LoggerInstalled)?;
    log::set_max_level(level);
    Ok(())
}

//! Bridges the `log` facade to a host-provided sink.
//!
//! Hosts that do not run a `log` backend of their own (an embedding app, a
//! test harness) implement [`Logger`] and install it once with
//! [`set_logger`]. Binaries that already install a subscriber, such as the
//! CLI, do not need this.

use std::sync::{Arc, OnceLock};

/// Receives the crate's log records.
///
/// ```rust
/// use seedkeeper_core::logger::{LogLevel, Logger};
///
/// struct Stderr;
///
/// impl Logger for Stderr {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Handles one formatted record.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// Normal lifecycle events (unlock, lock, clear).
    Info,
    /// Recoverable problems, such as the fallback to the memory store.
    Warn,
    /// Failures.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct HostLogger;

/// Debug and trace records from dependencies are noise for the host; only
/// this crate's own are forwarded at those levels.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let is_own = module_path.is_some_and(|path| path.starts_with("seedkeeper"));
    level <= log::Level::Info || is_own
}

impl log::Log for HostLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Installs `logger` as the sink for this crate's records.
///
/// Only the first call takes effect. If another `log` backend is already
/// installed in the process, the call is reported on stderr and ignored.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }
    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: HostLogger = HostLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

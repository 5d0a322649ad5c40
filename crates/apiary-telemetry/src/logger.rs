//! The logger capability.
//!
//! The request pipeline and the service lifecycle never call `tracing`
//! directly; they report through a [`Logger`] so callers can route output
//! elsewhere and tests can assert on what was logged.

use parking_lot::Mutex;
use std::error::Error;

/// A sink for lifecycle and error log lines.
pub trait Logger: Send + Sync {
    /// Logs an informational message.
    fn info(&self, message: &str);

    /// Logs a warning, optionally with the error that caused it.
    fn warn(&self, message: &str, detail: Option<&(dyn Error + 'static)>);

    /// Logs an error with its full source chain.
    fn error(&self, error: &(dyn Error + 'static));
}

fn source_chain(error: &(dyn Error + 'static)) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// A [`Logger`] that forwards to `tracing` events.
///
/// Installed by default. Output format and filtering follow whatever
/// subscriber [`crate::init_logging`] installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Creates a tracing logger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str, detail: Option<&(dyn Error + 'static)>) {
        match detail {
            Some(error) => tracing::warn!(error = %error, "{message}"),
            None => tracing::warn!("{message}"),
        }
    }

    fn error(&self, error: &(dyn Error + 'static)) {
        let chain = source_chain(error);
        if chain.is_empty() {
            tracing::error!(error = %error, "{error}");
        } else {
            tracing::error!(error = %error, causes = ?chain, "{error}");
        }
    }
}

/// Severity of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// A line captured by [`MemoryLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// The message, or the error's display text for error records.
    pub message: String,
    /// The attached error's display text, if any.
    pub detail: Option<String>,
}

/// A [`Logger`] that keeps every record in memory.
///
/// # Example
///
/// ```
/// use apiary_telemetry::{LogLevel, Logger, MemoryLogger};
///
/// let logger = MemoryLogger::new();
/// logger.warn("Server connection not found.", None);
///
/// assert_eq!(logger.records()[0].level, LogLevel::Warn);
/// ```
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything logged so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Returns the records at `level`.
    pub fn records_at(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.level == level)
            .cloned()
            .collect()
    }

    /// Returns `true` if a record at `level` has exactly `message`.
    pub fn contains(&self, level: LogLevel, message: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|record| record.level == level && record.message == message)
    }

    /// Discards every record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    fn push(&self, level: LogLevel, message: String, detail: Option<String>) {
        self.records.lock().push(LogRecord {
            level,
            message,
            detail,
        });
    }
}

impl Logger for MemoryLogger {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message.to_string(), None);
    }

    fn warn(&self, message: &str, detail: Option<&(dyn Error + 'static)>) {
        self.push(
            LogLevel::Warn,
            message.to_string(),
            detail.map(ToString::to_string),
        );
    }

    fn error(&self, error: &(dyn Error + 'static)) {
        let chain = source_chain(error);
        let detail = (!chain.is_empty()).then(|| chain.join(": "));
        self.push(LogLevel::Error, error.to_string(), detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger_records_levels() {
        let logger = MemoryLogger::new();
        logger.info("started");
        logger.warn("careful", None);
        logger.error(&std::io::Error::other("boom"));

        let records = logger.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[1].level, LogLevel::Warn);
        assert_eq!(records[2].level, LogLevel::Error);
        assert_eq!(records[2].message, "boom");
        assert!(logger.contains(LogLevel::Warn, "careful"));
    }

    #[test]
    fn test_warn_keeps_detail() {
        let logger = MemoryLogger::new();
        let cause = std::io::Error::other("disk full");
        logger.warn("write failed", Some(&cause));

        let warn = &logger.records_at(LogLevel::Warn)[0];
        assert_eq!(warn.detail.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_error_keeps_source_chain() {
        let logger = MemoryLogger::new();
        let error = anyhow::anyhow!("root cause").context("outer failure");
        logger.error(error.as_ref());

        let record = &logger.records_at(LogLevel::Error)[0];
        assert_eq!(record.message, "outer failure");
        assert_eq!(record.detail.as_deref(), Some("root cause"));
    }

    #[test]
    fn test_clear() {
        let logger = MemoryLogger::new();
        logger.info("one");
        logger.clear();
        assert!(logger.records().is_empty());
    }

    #[test]
    fn test_tracing_logger_without_subscriber() {
        let logger = TracingLogger::new();
        logger.info("no subscriber installed");
        logger.warn("still fine", Some(&std::io::Error::other("cause")));
        logger.error(&std::io::Error::other("boom"));
    }
}

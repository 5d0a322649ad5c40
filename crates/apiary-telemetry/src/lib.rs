//! Observability for Apiary services.
//!
//! - **Logging**: structured JSON or pretty logs through `tracing-subscriber`
//! - **Logger**: the [`Logger`] capability the pipeline and the service
//!   lifecycle report through, with a `tracing` backed default
//! - **Metrics**: error response counters through the `metrics` facade
//!
//! # Example
//!
//! ```rust,ignore
//! use apiary_telemetry::{init_logging, LogConfig, Logger, TracingLogger};
//!
//! init_logging(&LogConfig::production())?;
//!
//! let logger = TracingLogger::new();
//! logger.info("Trying to initialize the server.");
//! ```

#![doc(html_root_url = "https://docs.rs/apiary-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logger;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logger::{LogLevel, LogRecord, Logger, MemoryLogger, TracingLogger};
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

//! Error types for the listener and the service lifecycle.

use apiary_middleware::PipelineError;
use apiary_openapi::OpenApiError;
use apiary_telemetry::TelemetryError;
use thiserror::Error;

use crate::service::LifecycleState;

/// Errors raised by the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Open connections did not finish within the shutdown timeout.
    #[error("shutdown timed out with {active} connection(s) still active")]
    ShutdownTimeout {
        /// Connections still open when the timeout fired.
        active: usize,
    },

    /// The accept loop task panicked or was cancelled.
    #[error("listener task failed: {0}")]
    Task(String),
}

/// Why `init` failed.
#[derive(Debug, Error)]
pub enum InitError {
    /// `init` was called while the service was not stopped.
    #[error("service is {0}, expected stopped")]
    InvalidState(LifecycleState),

    /// No API document was given.
    #[error("no API document configured")]
    MissingApiDoc,

    /// The API document failed to load, validate or compile.
    #[error(transparent)]
    OpenApi(#[from] OpenApiError),

    /// A handler was registered for an operation the document lacks.
    #[error("handler registered for unknown operation '{0}'")]
    UnknownOperation(String),

    /// The pipeline rejected a stage.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The listener could not start.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Logging could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Errors returned by [`ApiService`](crate::ApiService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Startup failed. Nothing is left listening.
    #[error("Failed to init the server: {0}.")]
    Init(#[source] InitError),

    /// The listener did not close cleanly.
    #[error("Failed to close the server connection: {0}.")]
    Close(#[source] ServerError),
}

impl From<InitError> for ServiceError {
    fn from(error: InitError) -> Self {
        Self::Init(error)
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

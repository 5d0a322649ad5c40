//! The terminal stage.
//!
//! Every error that reaches the end of the pipeline ends here, exactly once.
//! Errors outside the [`ApiError`] taxonomy become
//! [`ApiError::InternalServer`]; their text is logged but never sent to the
//! client. Server errors are logged at error severity, client errors at
//! warning severity.

use std::sync::Arc;

use apiary_core::ApiError;
use apiary_telemetry::metrics::record_error_response;
use apiary_telemetry::{Logger, TracingLogger};
use http::StatusCode;

use crate::context::MiddlewareContext;
use crate::types::{Response, ResponseExt, JSON_CONTENT_TYPE};

/// Body sent if serializing an error body ever fails.
const FALLBACK_BODY: &str = r#"{"code":"INTERNAL_SERVER_ERROR","detail":"An unexpected error occurred on the server. Please try again later.","status":500,"title":"Internal Server Error."}"#;

/// Turns a raised error into the JSON error response.
#[derive(Clone)]
pub struct ResponseFinalizer {
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for ResponseFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFinalizer").finish_non_exhaustive()
    }
}

impl Default for ResponseFinalizer {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger::new()))
    }
}

impl ResponseFinalizer {
    /// Creates a finalizer that reports through `logger`.
    #[must_use]
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    /// Logs `error` and builds its response. Never fails.
    #[must_use]
    pub fn finalize(&self, ctx: &MiddlewareContext, error: anyhow::Error) -> Response {
        let api_error = error
            .downcast_ref::<ApiError>()
            .cloned()
            .unwrap_or_else(ApiError::internal_server);
        let status = api_error.status();

        let source: &(dyn std::error::Error + 'static) = error.as_ref();
        if status.is_server_error() {
            self.logger.error(source);
        } else {
            self.logger.warn(&error.to_string(), Some(source));
        }

        record_error_response(status.as_u16(), api_error.code());
        tracing::debug!(
            request_id = %ctx.request_id(),
            operation_id = ctx.operation_id().unwrap_or("-"),
            status = status.as_u16(),
            code = api_error.code(),
            "error response written"
        );

        match api_error.body().to_json() {
            Ok(body) => Response::with_body(status.to_status_code(), JSON_CONTENT_TYPE, body),
            Err(e) => {
                self.logger.error(&e);
                Response::with_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    JSON_CONTENT_TYPE,
                    FALLBACK_BODY,
                )
            }
        }
    }
}

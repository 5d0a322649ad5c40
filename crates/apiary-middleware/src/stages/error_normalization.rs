//! Error normalization.
//!
//! Runs on the error path, after routing and before the response finalizer.
//! Errors raised by the OpenAPI validator and the body parser are client
//! input faults; they are reshaped into [`ApiError::BadRequest`] carrying the
//! validator's message as `detail`. Anything else passes through unchanged.
//!
//! ```text
//! Router → handler ──Err──→ [ErrorNormalization] → ResponseFinalizer
//! ```
//!
//! # Example
//!
//! ```
//! use apiary_core::ApiError;
//! use apiary_middleware::context::MiddlewareContext;
//! use apiary_middleware::stages::ErrorNormalizationStage;
//! use apiary_middleware::ErrorStage;
//! use apiary_openapi::{HttpError, ValidationIssue};
//!
//! let raised = HttpError::bad_request(vec![ValidationIssue::new(
//!     "",
//!     "must have required property 'name'",
//! )]);
//!
//! let stage = ErrorNormalizationStage::new();
//! let normalized = stage.handle(&MiddlewareContext::new(), raised.into());
//!
//! let api_error = normalized.downcast_ref::<ApiError>().unwrap();
//! assert_eq!(api_error.detail(), "must have required property 'name'");
//! assert_eq!(api_error.status().as_u16(), 400);
//! ```

use apiary_core::ApiError;
use apiary_openapi::HttpError;
use tracing::debug;

use crate::context::MiddlewareContext;
use crate::middleware::ErrorStage;
use crate::stages::body_parser::BodyParseError;

/// Converts validator and body-parser errors into bad-request API errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorNormalizationStage;

impl ErrorNormalizationStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the detail to use if `error` is a client input fault.
    fn client_fault_detail(error: &anyhow::Error) -> Option<String> {
        if let Some(http_error) = error.downcast_ref::<HttpError>() {
            return Some(http_error.message().to_string());
        }
        error
            .downcast_ref::<BodyParseError>()
            .map(ToString::to_string)
    }
}

impl ErrorStage for ErrorNormalizationStage {
    fn name(&self) -> &'static str {
        "error_normalization"
    }

    fn handle(&self, ctx: &MiddlewareContext, error: anyhow::Error) -> anyhow::Error {
        match Self::client_fault_detail(&error) {
            Some(detail) => {
                debug!(
                    request_id = %ctx.request_id(),
                    error = %error,
                    "validation error normalized"
                );
                ApiError::bad_request_detail(detail).into()
            }
            None => error,
        }
    }
}

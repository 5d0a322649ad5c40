//! The Apiary error taxonomy.
//!
//! Every failure a client can observe is one of three [`ApiError`] variants:
//!
//! | Variant | Status | Default code |
//! |---|---|---|
//! | [`ApiError::BadRequest`] | 400 | `BAD_REQUEST_ERROR` |
//! | [`ApiError::Conflict`] | 409 | `CONFLICT_ERROR` |
//! | [`ApiError::InternalServer`] | 500 | `INTERNAL_SERVER_ERROR` |
//!
//! The status of each variant is fixed. `BadRequest` and `Conflict` accept
//! partial overrides of `code`, `detail` and `title` through [`ErrorOptions`];
//! `InternalServer` has fixed text so internal failures never leak to clients.

use crate::status::ApiStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;

/// Default `code`, `detail` and `title` values for each variant.
pub mod defaults {
    /// Default code for [`crate::ApiError::BadRequest`].
    pub const BAD_REQUEST_CODE: &str = "BAD_REQUEST_ERROR";
    /// Default detail for [`crate::ApiError::BadRequest`].
    pub const BAD_REQUEST_DETAIL: &str =
        "The request could not be processed due to invalid input. Please check the provided data.";
    /// Default title for [`crate::ApiError::BadRequest`].
    pub const BAD_REQUEST_TITLE: &str = "There was an error while validating the request.";

    /// Default code for [`crate::ApiError::Conflict`].
    pub const CONFLICT_CODE: &str = "CONFLICT_ERROR";
    /// Default detail for [`crate::ApiError::Conflict`].
    pub const CONFLICT_DETAIL: &str =
        "The request could not be completed due to a conflict with the current state of the resource.";
    /// Default title for [`crate::ApiError::Conflict`].
    pub const CONFLICT_TITLE: &str = "Conflict detected while processing the request.";

    /// Code of [`crate::ApiError::InternalServer`].
    pub const INTERNAL_SERVER_CODE: &str = "INTERNAL_SERVER_ERROR";
    /// Detail of [`crate::ApiError::InternalServer`].
    pub const INTERNAL_SERVER_DETAIL: &str =
        "An unexpected error occurred on the server. Please try again later.";
    /// Title of [`crate::ApiError::InternalServer`].
    pub const INTERNAL_SERVER_TITLE: &str = "Internal Server Error.";
}

/// Partial overrides for an [`ApiError`].
///
/// Unset fields, and fields set to an empty string, fall back to the
/// variant's default.
///
/// # Example
///
/// ```
/// use apiary_core::{ApiError, ErrorOptions};
///
/// let error = ApiError::bad_request(
///     ErrorOptions::new()
///         .code("INVALID_EMAIL")
///         .detail("The email address is malformed."),
/// );
///
/// assert_eq!(error.code(), "INVALID_EMAIL");
/// assert_eq!(error.title(), "There was an error while validating the request.");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorOptions {
    /// Machine-readable code override.
    pub code: Option<String>,
    /// Human-readable detail override.
    pub detail: Option<String>,
    /// Title override.
    pub title: Option<String>,
}

impl ErrorOptions {
    /// Creates options that keep every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the code.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Overrides the detail.
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Overrides the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

fn resolve(value: Option<String>, default: &str) -> String {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// A client-facing API error.
///
/// Each variant carries the base error fields and a status fixed by the
/// variant. Handlers usually return it through `anyhow::Error`; the response
/// finalizer downcasts it back and writes its [`ErrorBody`].
///
/// # Example
///
/// ```
/// use apiary_core::{ApiError, ApiStatus};
///
/// let error = ApiError::internal_server();
/// assert_eq!(error.status(), ApiStatus::InternalServerError);
/// assert_eq!(error.code(), "INTERNAL_SERVER_ERROR");
/// ```
///
/// The field-carrying variants are built through [`ApiError::bad_request`]
/// and [`ApiError::conflict`] only, so an empty field always falls back to
/// its default:
///
/// ```compile_fail
/// use apiary_core::ApiError;
///
/// let error = ApiError::BadRequest {
///     code: String::new(),
///     detail: String::new(),
///     title: String::new(),
/// };
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The client supplied invalid or malformed input.
    #[error("{detail}")]
    #[non_exhaustive]
    BadRequest {
        /// Machine-readable error code.
        code: String,
        /// Human-readable explanation.
        detail: String,
        /// Short category label.
        title: String,
    },

    /// The operation conflicts with the current state of the resource.
    #[error("{detail}")]
    #[non_exhaustive]
    Conflict {
        /// Machine-readable error code.
        code: String,
        /// Human-readable explanation.
        detail: String,
        /// Short category label.
        title: String,
    },

    /// An unanticipated failure. Its text is fixed.
    #[error("An unexpected error occurred on the server. Please try again later.")]
    InternalServer,
}

impl ApiError {
    /// Creates a 400 error, applying any overrides.
    #[must_use]
    pub fn bad_request(options: ErrorOptions) -> Self {
        Self::BadRequest {
            code: resolve(options.code, defaults::BAD_REQUEST_CODE),
            detail: resolve(options.detail, defaults::BAD_REQUEST_DETAIL),
            title: resolve(options.title, defaults::BAD_REQUEST_TITLE),
        }
    }

    /// Creates a 400 error whose detail is `detail`.
    ///
    /// Shorthand for `ApiError::bad_request(ErrorOptions::new().detail(detail))`.
    #[must_use]
    pub fn bad_request_detail(detail: impl Into<String>) -> Self {
        Self::bad_request(ErrorOptions::new().detail(detail))
    }

    /// Creates a 409 error, applying any overrides.
    #[must_use]
    pub fn conflict(options: ErrorOptions) -> Self {
        Self::Conflict {
            code: resolve(options.code, defaults::CONFLICT_CODE),
            detail: resolve(options.detail, defaults::CONFLICT_DETAIL),
            title: resolve(options.title, defaults::CONFLICT_TITLE),
        }
    }

    /// Creates the 500 error.
    #[must_use]
    pub const fn internal_server() -> Self {
        Self::InternalServer
    }

    /// Returns the HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> ApiStatus {
        match self {
            Self::BadRequest { .. } => ApiStatus::BadRequest,
            Self::Conflict { .. } => ApiStatus::Conflict,
            Self::InternalServer => ApiStatus::InternalServerError,
        }
    }

    /// Returns the machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::BadRequest { code, .. } | Self::Conflict { code, .. } => code.as_str(),
            Self::InternalServer => defaults::INTERNAL_SERVER_CODE,
        }
    }

    /// Returns the human-readable detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { detail, .. } | Self::Conflict { detail, .. } => detail.as_str(),
            Self::InternalServer => defaults::INTERNAL_SERVER_DETAIL,
        }
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::BadRequest { title, .. } | Self::Conflict { title, .. } => title.as_str(),
            Self::InternalServer => defaults::INTERNAL_SERVER_TITLE,
        }
    }

    /// Returns the serializable response body for this error.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            detail: self.detail().to_string(),
            status: self.status(),
            title: self.title().to_string(),
        }
    }
}

/// The response body written for every error: exactly
/// `{code, detail, status, title}`, in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable explanation.
    pub detail: String,
    /// HTTP status.
    pub status: ApiStatus,
    /// Short category label.
    pub title: String,
}

impl ErrorBody {
    /// Serializes the body to JSON bytes.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl From<&ApiError> for ErrorBody {
    fn from(error: &ApiError) -> Self {
        error.body()
    }
}

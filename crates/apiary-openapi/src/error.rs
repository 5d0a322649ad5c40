//! OpenAPI error types.
//!
//! Two families live here:
//!
//! - [`OpenApiError`] covers loading and compiling an API document. These
//!   happen at startup and fail service initialization.
//! - [`HttpError`] is raised while handling a request: unknown routes,
//!   parameter and body violations, undeclared responses. The error
//!   normalization stage turns every `HttpError` into a 400 API error.

use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Result type for document operations.
pub type OpenApiResult<T> = Result<T, OpenApiError>;

/// Errors raised while loading or compiling an API document.
#[derive(Debug, Error)]
pub enum OpenApiError {
    /// The document could not be read or fetched.
    #[error("failed to load API document: {0}")]
    Load(String),

    /// The document is not valid JSON or YAML for an OpenAPI document.
    #[error("failed to parse API document: {0}")]
    Parse(String),

    /// The document parsed but breaks structural rules.
    #[error("invalid API document: {}", .errors.join("; "))]
    InvalidDocument {
        /// Every violation found.
        errors: Vec<String>,
    },

    /// A schema in the document could not be compiled.
    #[error("invalid schema at {location}: {message}")]
    InvalidSchema {
        /// Where the schema sits in the document.
        location: String,
        /// Compiler message.
        message: String,
    },

    /// A `$ref` points at something that does not exist.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The kind of a request-time [`HttpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpErrorKind {
    /// A parameter or the body violates its schema.
    BadRequest,
    /// No route matches the path.
    NotFound,
    /// The path exists but not for this method.
    MethodNotAllowed,
    /// The request content type is not declared for the operation.
    UnsupportedMediaType,
    /// The handler's response does not match the document.
    InternalServerError,
}

impl HttpErrorKind {
    /// Returns the HTTP status the validator associates with this kind.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// One schema violation, located by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the value, e.g. `request/body/name` or `request/query/limit`.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} {}", self.path, self.message)
        }
    }
}

/// An error raised by route resolution or schema validation.
///
/// Its display text is the validation message, joined with `, ` when several
/// issues were found.
///
/// # Example
///
/// ```
/// use apiary_openapi::{HttpError, ValidationIssue};
///
/// let error = HttpError::bad_request(vec![ValidationIssue::new(
///     "request/body",
///     "must have required property 'name'",
/// )]);
/// assert_eq!(error.to_string(), "request/body must have required property 'name'");
/// assert_eq!(error.status().as_u16(), 400);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
    issues: Vec<ValidationIssue>,
}

impl HttpError {
    /// Creates an error with a plain message.
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            issues: Vec::new(),
        }
    }

    fn from_issues(kind: HttpErrorKind, issues: Vec<ValidationIssue>) -> Self {
        let message = issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            kind,
            message,
            issues,
        }
    }

    /// A request that violates the document.
    pub fn bad_request(issues: Vec<ValidationIssue>) -> Self {
        Self::from_issues(HttpErrorKind::BadRequest, issues)
    }

    /// A path no route matches.
    pub fn not_found() -> Self {
        Self::new(HttpErrorKind::NotFound, "not found")
    }

    /// A path that exists for other methods.
    pub fn method_not_allowed(method: &str) -> Self {
        Self::new(
            HttpErrorKind::MethodNotAllowed,
            format!("{} method not allowed", method.to_uppercase()),
        )
    }

    /// A request content type the operation does not declare.
    pub fn unsupported_media_type(content_type: &str) -> Self {
        Self::new(
            HttpErrorKind::UnsupportedMediaType,
            format!("unsupported media type {content_type}"),
        )
    }

    /// A response that violates the document.
    pub fn invalid_response(issues: Vec<ValidationIssue>) -> Self {
        Self::from_issues(HttpErrorKind::InternalServerError, issues)
    }

    /// Returns the kind.
    #[must_use]
    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    /// Returns the status the validator associates with this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the individual issues, if the error came from schema checks.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

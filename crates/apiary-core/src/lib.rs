//! # Apiary Core
//!
//! Core types shared by every Apiary crate.
//!
//! - [`ApiError`] - The closed error taxonomy (400, 409, 500) every client-facing
//!   failure is expressed in
//! - [`ErrorOptions`] - Partial overrides for `code`, `detail` and `title`
//! - [`ErrorBody`] - The exact `{code, detail, status, title}` response body
//! - [`ApiStatus`] - The status codes the taxonomy can carry
//! - [`RequestId`] - UUID v7 request identifier
//!
//! # Example
//!
//! ```
//! use apiary_core::{ApiError, ApiStatus, ErrorOptions};
//!
//! let error = ApiError::conflict(ErrorOptions::new().detail("User already exists."));
//! assert_eq!(error.status(), ApiStatus::Conflict);
//! assert_eq!(error.code(), "CONFLICT_ERROR");
//! assert_eq!(error.detail(), "User already exists.");
//! ```

#![doc(html_root_url = "https://docs.rs/apiary-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod request_id;
mod status;

pub use error::{defaults, ApiError, ApiResult, ErrorBody, ErrorOptions};
pub use request_id::RequestId;
pub use status::{ApiStatus, UnsupportedStatus, STATUS_CREATED};

//! Pipeline stages.
//!
//! ## Request path
//!
//! 1. [`cors`] - Preflight answers and CORS response headers
//! 2. [`body_parser`] - JSON body parsing
//! 3. [`openapi`] - Route resolution and request validation
//!
//! ## Error path
//!
//! 4. [`error_normalization`] - Validator errors to bad-request API errors
//! 5. [`response_finalizer`] - Logging and the JSON error response

pub mod body_parser;
pub mod cors;
pub mod error_normalization;
pub mod openapi;
pub mod response_finalizer;

pub use body_parser::{BodyParseError, BodyParserMiddleware};
pub use cors::{AllowedOrigins, CorsBuilder, CorsConfig, CorsMiddleware};
pub use error_normalization::ErrorNormalizationStage;
pub use openapi::OpenApiMiddleware;
pub use response_finalizer::ResponseFinalizer;

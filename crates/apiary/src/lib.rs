//! # Apiary
//!
//! **OpenAPI-driven HTTP services with one consistent error model**
//!
//! Apiary serves an API described by an OpenAPI 3 document:
//!
//! - **Typed errors**: `BadRequest` (400), `Conflict` (409) and
//!   `InternalServer` (500), each with defaulted `code`, `detail` and `title`
//! - **Contract routing**: operations resolve from the document, and
//!   requests and responses are checked against its schemas
//! - **One error envelope**: whatever a handler or validator raises leaves
//!   as `{"code","detail","status","title"}`
//! - **Fixed pipeline**: stage order is enforced when the pipeline is built
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use apiary::prelude::*;
//!
//! #[derive(serde::Deserialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("apiary.toml")?
//!         .with_dotenv()?
//!         .with_env_prefix("APIARY")
//!         .load()?;
//!
//!     let app = App::new()
//!         .json("createUser", http::StatusCode::CREATED, |_req, user: NewUser| async move {
//!             if user.name.is_empty() {
//!                 return Err(anyhow::Error::from(ApiError::bad_request_detail("name is empty")));
//!             }
//!             Ok(serde_json::json!({ "name": user.name }))
//!         })
//!         .operation("health", |_req| async { Ok(Reply::no_content()) });
//!
//!     let init = ApiServiceInit::from_config(app, Arc::new(TracingLogger::new()), config)?;
//!     ApiService::run(init).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → CORS → BodyParser → Router (OpenAPI) → Handler
//!                                                     │ Err
//! Response ← ResponseFinalizer ← ErrorNormalization ←─┘
//! ```

#![doc(html_root_url = "https://docs.rs/apiary/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Error taxonomy
pub use apiary_core as core;

// OpenAPI loading, routing and validation
pub use apiary_openapi as openapi;

// Pipeline and stages
pub use apiary_middleware as middleware;

// Listener, handlers and lifecycle
pub use apiary_server as server;

// Logging and metrics
pub use apiary_telemetry as telemetry;

// Layered configuration
pub use apiary_config as config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use apiary::prelude::*;
///
/// let error = ApiError::conflict(ErrorOptions::new().detail("User 'Ada' already exists."));
/// assert_eq!(error.status().as_u16(), 409);
/// ```
pub mod prelude {
    pub use apiary_core::{ApiError, ApiResult, ApiStatus, ErrorBody, ErrorOptions, RequestId};

    pub use apiary_openapi::{ApiContract, ApiDocSource, DocumentFormat, DocumentLoader};

    pub use apiary_middleware::stages::{
        BodyParserMiddleware, CorsMiddleware, ErrorNormalizationStage, OpenApiMiddleware,
        ResponseFinalizer,
    };
    pub use apiary_middleware::{MiddlewareContext, Pipeline, PipelineBuilder};

    pub use apiary_server::{
        ApiService, ApiServiceInit, App, HandlerRequest, LifecycleState, Reply, ServiceError,
    };

    pub use apiary_telemetry::{init_logging, LogConfig, Logger, MemoryLogger, TracingLogger};

    pub use apiary_config::{ApiaryConfig, ConfigLoader};
}

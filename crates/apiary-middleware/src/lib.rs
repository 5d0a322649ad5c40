//! # Apiary Middleware
//!
//! The ordered request pipeline that makes the Apiary error model work end
//! to end.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → CORS → BodyParser → Router (OpenAPI) → Handler
//!                                                     │ Err
//! Response ← ResponseFinalizer ← ErrorNormalization ←─┘
//! ```
//!
//! | Stage | Component                 | Purpose                                      |
//! |-------|---------------------------|----------------------------------------------|
//! | 1     | `CorsMiddleware`          | Preflight answers, CORS headers              |
//! | 2     | `BodyParserMiddleware`    | Parse `application/vnd.api+json` bodies      |
//! | 3     | `OpenApiMiddleware`       | Resolve the operation, validate the request  |
//! | 4     | `ErrorNormalizationStage` | Validator errors become 400 API errors       |
//! | 5     | `ResponseFinalizer`       | Log the error, write the JSON error envelope |
//!
//! Stages 4 and 5 run only when something upstream raised an error. The
//! [`PipelineBuilder`] rejects installs that break this order.
//!
//! ## Example
//!
//! ```
//! use apiary_core::ApiError;
//! use apiary_middleware::stages::{CorsMiddleware, ErrorNormalizationStage, ResponseFinalizer};
//! use apiary_middleware::{MiddlewareContext, Pipeline, Request};
//! use bytes::Bytes;
//! use http_body_util::Full;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder()
//!     .cors(CorsMiddleware::default())?
//!     .error_normalizer(ErrorNormalizationStage::new())?
//!     .finalizer(ResponseFinalizer::default())?
//!     .build()?;
//!
//! let request: Request = http::Request::new(Full::new(Bytes::new()));
//! let response = pipeline
//!     .process(MiddlewareContext::new(), request, |_ctx, _req| {
//!         Box::pin(async { Err(anyhow::Error::from(ApiError::bad_request_detail("name is taken"))) })
//!     })
//!     .await;
//!
//! assert_eq!(response.status(), 400);
//! # Ok::<(), apiary_middleware::PipelineError>(())
//! # }).unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/apiary-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, ErrorStage, FnErrorStage, Handler, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, PipelineResult, Stage};
pub use types::{Request, Response, ResponseExt, StageResult, JSON_CONTENT_TYPE};

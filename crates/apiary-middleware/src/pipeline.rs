//! Ordered middleware pipeline.
//!
//! ## Stages
//!
//! The pipeline installs up to five stages, always in this order:
//!
//! 1. **CORS** - preflight answers, CORS headers
//! 2. **Body parser** - JSON body parsing
//! 3. **Router** - route resolution and request validation
//! 4. **Error normalization** - error path only
//! 5. **Response finalizer** - error path only, terminal
//!
//! Request stages may be left out, but none may be installed before a stage
//! that precedes it. The finalizer is mandatory, so every raised error
//! reaches it exactly once and becomes exactly one response.

use crate::context::{MiddlewareContext, REQUEST_ID_HEADER};
use crate::middleware::{BoxFuture, ErrorStage, Middleware, Next};
use crate::stages::{BodyParserMiddleware, CorsMiddleware, ResponseFinalizer};
use crate::types::{Request, Response, StageResult};
use http::HeaderValue;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A type-erased request stage.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A type-erased error stage.
pub type BoxedErrorStage = Arc<dyn ErrorStage>;

/// Result type for pipeline assembly.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while assembling a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A stage was installed after a stage it must precede.
    #[error("stage '{stage}' cannot be installed after '{after}'")]
    OutOfOrder {
        /// The stage being installed.
        stage: Stage,
        /// The last stage already installed.
        after: Stage,
    },

    /// A component was installed in a slot of the wrong kind.
    #[error("stage '{0}' does not accept this kind of component")]
    WrongKind(Stage),

    /// `build` was called without a response finalizer.
    #[error("pipeline has no response finalizer")]
    MissingFinalizer,
}

/// A pipeline slot, in install order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// CORS.
    Cors = 1,
    /// Body parsing.
    BodyParser = 2,
    /// Routing and request validation.
    Router = 3,
    /// Error normalization.
    ErrorNormalization = 4,
    /// The terminal response finalizer.
    ResponseFinalizer = 5,
}

impl Stage {
    /// Returns true for stages on the request path.
    #[must_use]
    pub const fn is_request_stage(self) -> bool {
        (self as u8) <= 3
    }

    /// Returns true for error-path stages other than the finalizer.
    #[must_use]
    pub const fn is_error_stage(self) -> bool {
        matches!(self, Self::ErrorNormalization)
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::BodyParser => "body_parser",
            Self::Router => "router",
            Self::ErrorNormalization => "error_normalization",
            Self::ResponseFinalizer => "response_finalizer",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Cors,
            Self::BodyParser,
            Self::Router,
            Self::ErrorNormalization,
            Self::ResponseFinalizer,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The assembled pipeline.
///
/// # Example
///
/// ```
/// use apiary_middleware::pipeline::{Pipeline, PipelineError, Stage};
/// use apiary_middleware::stages::{BodyParserMiddleware, CorsMiddleware, ResponseFinalizer};
///
/// let pipeline = Pipeline::builder()
///     .cors(CorsMiddleware::default())?
///     .body_parser(BodyParserMiddleware::default())?
///     .finalizer(ResponseFinalizer::default())?
///     .build()?;
/// assert_eq!(pipeline.stage_names(), vec!["cors", "body_parser", "response_finalizer"]);
///
/// // Out-of-order installs are rejected.
/// let err = Pipeline::builder()
///     .body_parser(BodyParserMiddleware::default())?
///     .cors(CorsMiddleware::default())
///     .unwrap_err();
/// assert_eq!(err, PipelineError::OutOfOrder { stage: Stage::Cors, after: Stage::BodyParser });
/// # Ok::<(), PipelineError>(())
/// ```
pub struct Pipeline {
    request_stages: Vec<(Stage, BoxedMiddleware)>,
    error_stages: Vec<(Stage, BoxedErrorStage)>,
    finalizer: ResponseFinalizer,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs a request through the pipeline and the terminal `handler`.
    ///
    /// Never fails: raised errors go through the error stages and the
    /// finalizer. Headers recorded in the context are added to whatever
    /// response is sent.
    pub async fn process<H>(&self, mut ctx: MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, StageResult> + Send + 'static,
    {
        let result = self.build_chain(handler).run(&mut ctx, request).await;

        match result {
            Ok(response) => Self::decorate(&ctx, response),
            Err(error) => self.reject(&ctx, error),
        }
    }

    /// Sends an error raised outside the request stages through the error
    /// path, as if a stage had raised it.
    pub fn reject(&self, ctx: &MiddlewareContext, error: anyhow::Error) -> Response {
        let error = self
            .error_stages
            .iter()
            .fold(error, |error, (_, stage)| stage.handle(ctx, error));
        Self::decorate(ctx, self.finalizer.finalize(ctx, error))
    }

    fn decorate(ctx: &MiddlewareContext, mut response: Response) -> Response {
        let headers = response.headers_mut();
        for name in ctx.response_headers().keys() {
            if !headers.contains_key(name) {
                for value in ctx.response_headers().get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        response
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, StageResult> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for (_, middleware) in self.request_stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the installed stages in order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.request_stages
            .iter()
            .map(|(stage, _)| *stage)
            .chain(self.error_stages.iter().map(|(stage, _)| *stage))
            .chain(std::iter::once(Stage::ResponseFinalizer))
            .collect()
    }

    /// Returns the names of the installed stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages().into_iter().map(Stage::name).collect()
    }

    /// Returns the number of installed stages, the finalizer included.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.request_stages.len() + self.error_stages.len() + 1
    }
}

/// Builder for a [`Pipeline`].
///
/// Each install checks the stage comes after the last one installed.
#[derive(Default)]
pub struct PipelineBuilder {
    last: Option<Stage>,
    request_stages: Vec<(Stage, BoxedMiddleware)>,
    error_stages: Vec<(Stage, BoxedErrorStage)>,
    finalizer: Option<ResponseFinalizer>,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn advance(&mut self, stage: Stage) -> PipelineResult<()> {
        if let Some(after) = self.last {
            if stage <= after {
                return Err(PipelineError::OutOfOrder { stage, after });
            }
        }
        self.last = Some(stage);
        Ok(())
    }

    /// Installs a request-path stage in the given slot.
    pub fn add_request_stage<M: Middleware>(mut self, stage: Stage, middleware: M) -> PipelineResult<Self> {
        if !stage.is_request_stage() {
            return Err(PipelineError::WrongKind(stage));
        }
        self.advance(stage)?;
        self.request_stages.push((stage, Arc::new(middleware)));
        Ok(self)
    }

    /// Installs an error-path stage in the given slot.
    pub fn add_error_stage<E: ErrorStage>(mut self, stage: Stage, error_stage: E) -> PipelineResult<Self> {
        if !stage.is_error_stage() {
            return Err(PipelineError::WrongKind(stage));
        }
        self.advance(stage)?;
        self.error_stages.push((stage, Arc::new(error_stage)));
        Ok(self)
    }

    /// Installs the CORS stage.
    pub fn cors(self, cors: CorsMiddleware) -> PipelineResult<Self> {
        self.add_request_stage(Stage::Cors, cors)
    }

    /// Installs the body parser.
    pub fn body_parser(self, parser: BodyParserMiddleware) -> PipelineResult<Self> {
        self.add_request_stage(Stage::BodyParser, parser)
    }

    /// Installs the router stage.
    pub fn router<M: Middleware>(self, router: M) -> PipelineResult<Self> {
        self.add_request_stage(Stage::Router, router)
    }

    /// Installs the error normalizer.
    pub fn error_normalizer<E: ErrorStage>(self, normalizer: E) -> PipelineResult<Self> {
        self.add_error_stage(Stage::ErrorNormalization, normalizer)
    }

    /// Installs the response finalizer. Nothing can be installed after it.
    pub fn finalizer(mut self, finalizer: ResponseFinalizer) -> PipelineResult<Self> {
        self.advance(Stage::ResponseFinalizer)?;
        self.finalizer = Some(finalizer);
        Ok(self)
    }

    /// Builds the pipeline.
    pub fn build(self) -> PipelineResult<Pipeline> {
        let finalizer = self.finalizer.ok_or(PipelineError::MissingFinalizer)?;
        Ok(Pipeline {
            request_stages: self.request_stages,
            error_stages: self.error_stages,
            finalizer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnErrorStage;
    use crate::stages::ErrorNormalizationStage;
    use crate::types::ResponseExt;
    use apiary_core::ApiError;
    use apiary_telemetry::{LogLevel, MemoryLogger};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use std::sync::Mutex;

    struct Recording {
        order: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Middleware for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, StageResult> {
            Box::pin(async move {
                self.order.lock().unwrap().push(self.name);
                next.run(ctx, request).await
            })
        }
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/users")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn test_stage_ordering() {
        let stages = Stage::all();
        assert!(stages.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(Stage::Router.is_request_stage());
        assert!(!Stage::ErrorNormalization.is_request_stage());
        assert!(Stage::ErrorNormalization.is_error_stage());
        assert!(!Stage::ResponseFinalizer.is_error_stage());
    }

    #[test]
    fn test_rejects_out_of_order_install() {
        let err = Pipeline::builder()
            .finalizer(ResponseFinalizer::default())
            .unwrap()
            .error_normalizer(ErrorNormalizationStage::new())
            .unwrap_err();

        assert_eq!(
            err,
            PipelineError::OutOfOrder {
                stage: Stage::ErrorNormalization,
                after: Stage::ResponseFinalizer,
            }
        );
        assert_eq!(
            err.to_string(),
            "stage 'error_normalization' cannot be installed after 'response_finalizer'"
        );
    }

    #[test]
    fn test_rejects_duplicate_install() {
        let result = Pipeline::builder()
            .cors(CorsMiddleware::default())
            .unwrap()
            .cors(CorsMiddleware::default());
        assert!(matches!(result, Err(PipelineError::OutOfOrder { .. })));
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let result = Pipeline::builder().add_request_stage(
            Stage::ErrorNormalization,
            CorsMiddleware::default(),
        );
        assert!(matches!(
            result,
            Err(PipelineError::WrongKind(Stage::ErrorNormalization))
        ));
    }

    #[test]
    fn test_requires_finalizer() {
        let result = Pipeline::builder()
            .cors(CorsMiddleware::default())
            .unwrap()
            .build();
        assert!(matches!(result, Err(PipelineError::MissingFinalizer)));
    }

    #[tokio::test]
    async fn test_request_stages_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .add_request_stage(Stage::Cors, Recording { order: order.clone(), name: "first" })
            .unwrap()
            .add_request_stage(Stage::Router, Recording { order: order.clone(), name: "second" })
            .unwrap()
            .finalizer(ResponseFinalizer::default())
            .unwrap()
            .build()
            .unwrap();

        let response = pipeline
            .process(MiddlewareContext::new(), request(), |_ctx, _req| {
                Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(pipeline.stage_count(), 3);
    }

    #[tokio::test]
    async fn test_error_path_runs_error_stages_then_finalizer() {
        let logger = Arc::new(MemoryLogger::new());
        let pipeline = Pipeline::builder()
            .error_normalizer(FnErrorStage::new(
                "conflict",
                |_: &MiddlewareContext, _: anyhow::Error| {
                    anyhow::Error::from(ApiError::conflict(apiary_core::ErrorOptions::new()))
                },
            ))
            .unwrap()
            .finalizer(ResponseFinalizer::new(logger.clone()))
            .unwrap()
            .build()
            .unwrap();

        let response = pipeline
            .process(MiddlewareContext::new(), request(), |_ctx, _req| {
                Box::pin(async { Err(anyhow::anyhow!("stale version")) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(logger.records_at(LogLevel::Warn).len(), 1);
    }

    #[tokio::test]
    async fn test_context_headers_apply_to_error_responses() {
        let pipeline = Pipeline::builder()
            .cors(CorsMiddleware::default())
            .unwrap()
            .finalizer(ResponseFinalizer::new(Arc::new(MemoryLogger::new())))
            .unwrap()
            .build()
            .unwrap();

        let response = pipeline
            .process(MiddlewareContext::new(), request(), |_ctx, _req| {
                Box::pin(async { Err(anyhow::anyhow!("boom")) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[test]
    fn test_reject_uses_error_path() {
        let pipeline = Pipeline::builder()
            .error_normalizer(ErrorNormalizationStage::new())
            .unwrap()
            .finalizer(ResponseFinalizer::new(Arc::new(MemoryLogger::new())))
            .unwrap()
            .build()
            .unwrap();
        let ctx = MiddlewareContext::new();

        let response = pipeline.reject(
            &ctx,
            anyhow::Error::from(ApiError::bad_request_detail("body read failed")),
        );

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[REQUEST_ID_HEADER],
            ctx.request_id().to_string().as_str()
        );
    }
}

//! The service lifecycle.
//!
//! [`ApiService`] owns at most one [`Listener`]. `init` loads and compiles
//! the API document, assembles the request pipeline in its fixed order and
//! starts listening. `close` drains the listener. Both take `&mut self`, so
//! a service cannot be initialized and closed at the same time.
//!
//! ```text
//! Stopped ──init──▶ Starting ──▶ Listening ──close──▶ Closing ──▶ Stopped
//!                      │ error
//!                      ▼
//!                   Stopped
//! ```

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apiary_config::ApiaryConfig;
use apiary_middleware::stages::{
    BodyParserMiddleware, CorsMiddleware, ErrorNormalizationStage, OpenApiMiddleware,
    ResponseFinalizer,
};
use apiary_middleware::Pipeline;
use apiary_openapi::{validate_document, ApiContract, ApiDocSource, DocumentLoader};
use apiary_telemetry::metrics::describe_metrics;
use apiary_telemetry::{init_logging, Logger};
use http::Method;

use crate::app::{App, Dispatcher};
use crate::error::{InitError, ServiceError, ServiceResult};
use crate::server::{Listener, Server};
use crate::shutdown::os_signal;

/// Where a service is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Not listening. The only state `init` accepts.
    #[default]
    Stopped,
    /// `init` is in progress.
    Starting,
    /// Accepting connections.
    Listening,
    /// `close` is draining connections.
    Closing,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Closing => "closing",
        })
    }
}

/// Everything `init` needs.
pub struct ApiServiceInit {
    /// The OpenAPI document to serve.
    pub api_doc: ApiDocSource,
    /// Handlers, keyed by `operationId`.
    pub app: App,
    /// Receives lifecycle and error log lines.
    pub logger: Arc<dyn Logger>,
    /// Port to listen on. `0` picks an ephemeral port.
    pub port: u16,
    /// Host, pipeline and validation settings.
    pub config: ApiaryConfig,
}

impl fmt::Debug for ApiServiceInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiServiceInit")
            .field("api_doc", &self.api_doc)
            .field("app", &self.app)
            .field("port", &self.port)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApiServiceInit {
    /// Creates init options with the default configuration.
    #[must_use]
    pub fn new(api_doc: ApiDocSource, app: App, logger: Arc<dyn Logger>, port: u16) -> Self {
        Self {
            api_doc,
            app,
            logger,
            port,
            config: ApiaryConfig::default(),
        }
    }

    /// Builds init options from a loaded configuration. The document and
    /// port come from the `openapi` and `server` sections.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingApiDoc`] if `openapi.api_doc` is unset.
    pub fn from_config(
        app: App,
        logger: Arc<dyn Logger>,
        config: ApiaryConfig,
    ) -> ServiceResult<Self> {
        let api_doc = config
            .openapi
            .api_doc
            .as_deref()
            .map(ApiDocSource::parse)
            .ok_or(InitError::MissingApiDoc)?;

        Ok(Self {
            api_doc,
            app,
            logger,
            port: config.server.port,
            config,
        })
    }

    /// Replaces the configuration. The port set on these options is kept.
    #[must_use]
    pub fn with_config(mut self, config: ApiaryConfig) -> Self {
        self.config = config;
        self
    }
}

/// An API service with an explicit lifecycle.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use apiary_openapi::ApiDocSource;
/// use apiary_server::{ApiService, ApiServiceInit, App, Reply};
/// use apiary_telemetry::TracingLogger;
///
/// # async fn run() -> Result<(), apiary_server::ServiceError> {
/// let app = App::new().operation("health", |_req| async { Ok(Reply::no_content()) });
/// let logger = Arc::new(TracingLogger::new());
///
/// let mut service = ApiService::new();
/// service
///     .init(ApiServiceInit::new(ApiDocSource::parse("api.yaml"), app, logger.clone(), 3000))
///     .await?;
///
/// service.close(logger.as_ref()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ApiService {
    state: LifecycleState,
    listener: Option<Listener>,
}

impl ApiService {
    /// Creates a stopped service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the bound address while listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(Listener::local_addr)
    }

    /// Loads the API document, installs the pipeline and starts listening.
    ///
    /// Fails fast: on any error nothing is left listening and the service
    /// is back to [`LifecycleState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Init`] if the service is not stopped, or if
    /// loading, compiling, wiring or binding fails.
    pub async fn init(&mut self, init: ApiServiceInit) -> ServiceResult<()> {
        if self.state != LifecycleState::Stopped {
            return Err(InitError::InvalidState(self.state).into());
        }

        let logger = Arc::clone(&init.logger);
        logger.info("Trying to initialize the server.");
        self.state = LifecycleState::Starting;

        match start(init).await {
            Ok(listener) => {
                let port = listener.local_addr().port();
                self.listener = Some(listener);
                self.state = LifecycleState::Listening;
                logger.info(&format!(
                    "Server connection established successfully on 'PORT:{port}'."
                ));
                Ok(())
            }
            Err(error) => {
                self.state = LifecycleState::Stopped;
                Err(ServiceError::Init(error))
            }
        }
    }

    /// Stops the listener and waits for it to confirm.
    ///
    /// Closing a service that is not listening logs a warning and succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Close`] if open connections outlive the
    /// shutdown timeout or the listener task failed. The service ends up
    /// stopped either way.
    pub async fn close(&mut self, logger: &dyn Logger) -> ServiceResult<()> {
        let Some(listener) = self.listener.take() else {
            logger.warn("Server connection not found.", None);
            return Ok(());
        };

        self.state = LifecycleState::Closing;
        let result = listener.close().await;
        self.state = LifecycleState::Stopped;

        result.map_err(ServiceError::Close)?;
        logger.info("Server connection closed successfully.");
        Ok(())
    }

    /// Waits for `signal`, then closes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Close`] as [`close`](Self::close) does.
    pub async fn serve_until<F>(&mut self, signal: F, logger: &dyn Logger) -> ServiceResult<()>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.close(logger).await
    }

    /// Installs logging from `init.config`, describes the metrics, starts
    /// the service and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Init`] if logging or startup fails and
    /// [`ServiceError::Close`] if shutdown does.
    pub async fn run(init: ApiServiceInit) -> ServiceResult<()> {
        init_logging(&init.config.logging.to_log_config()).map_err(InitError::from)?;
        describe_metrics();

        let logger = Arc::clone(&init.logger);
        let mut service = Self::new();
        service.init(init).await?;
        service.serve_until(os_signal(), logger.as_ref()).await
    }
}

async fn start(init: ApiServiceInit) -> Result<Listener, InitError> {
    let ApiServiceInit {
        api_doc,
        app,
        logger,
        port,
        config,
    } = init;

    let document = DocumentLoader::load(&api_doc).await?;
    if config.openapi.validate_api_doc {
        validate_document(&document)?;
    }
    let contract = Arc::new(ApiContract::compile(&document)?);
    app.bind(&contract, logger.as_ref())?;

    let pipeline = build_pipeline(&config, Arc::clone(&contract), logger)?;
    let dispatcher =
        Dispatcher::new(app, contract).validate_responses(config.openapi.validate_responses);

    let addr = format!("{}:{port}", config.server.host);
    let listener = Server::new(pipeline, dispatcher)
        .shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout_secs))
        .body_limit(config.body.limit_bytes)
        .bind(&addr)
        .await?;
    Ok(listener)
}

fn build_pipeline(
    config: &ApiaryConfig,
    contract: Arc<ApiContract>,
    logger: Arc<dyn Logger>,
) -> Result<Pipeline, InitError> {
    let mut cors = CorsMiddleware::builder()
        .allow_origins(config.cors.allowed_origins.iter().cloned())
        .allow_methods(
            config
                .cors
                .allowed_methods
                .iter()
                .filter_map(|method| Method::from_bytes(method.as_bytes()).ok()),
        )
        .allow_headers(config.cors.allowed_headers.iter().cloned())
        .expose_headers(config.cors.expose_headers.iter().cloned())
        .allow_credentials(config.cors.allow_credentials);
    if let Some(secs) = config.cors.max_age_secs {
        cors = cors.max_age(Duration::from_secs(secs));
    }

    let pipeline = Pipeline::builder()
        .cors(cors.build())?
        .body_parser(BodyParserMiddleware::new(
            &config.body.content_types,
            config.body.limit_bytes,
        ))?
        .router(OpenApiMiddleware::new(contract).validate_requests(config.openapi.validate_requests))?
        .error_normalizer(ErrorNormalizationStage::new())?
        .finalizer(ResponseFinalizer::new(logger))?
        .build()?;
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Reply;
    use apiary_telemetry::{LogLevel, MemoryLogger};

    const DOC: &str = r"
openapi: 3.0.3
info: { title: Health, version: 1.0.0 }
paths:
  /health:
    get:
      operationId: health
      responses:
        '204': { description: healthy }
";

    fn init_options(logger: Arc<MemoryLogger>) -> ApiServiceInit {
        let app = App::new().operation("health", |_req| async { Ok(Reply::no_content()) });
        let mut config = ApiaryConfig::default();
        config.server.host = "127.0.0.1".to_string();
        ApiServiceInit::new(ApiDocSource::yaml(DOC), app, logger, 0).with_config(config)
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
        assert_eq!(LifecycleState::Closing.to_string(), "closing");
        assert_eq!(LifecycleState::default(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_init_and_close() {
        let logger = Arc::new(MemoryLogger::new());
        let mut service = ApiService::new();

        service.init(init_options(Arc::clone(&logger))).await.unwrap();
        assert_eq!(service.state(), LifecycleState::Listening);
        let port = service.local_addr().unwrap().port();
        assert_ne!(port, 0);

        assert!(logger.contains(LogLevel::Info, "Trying to initialize the server."));
        assert!(logger.contains(
            LogLevel::Info,
            &format!("Server connection established successfully on 'PORT:{port}'.")
        ));

        service.close(logger.as_ref()).await.unwrap();
        assert_eq!(service.state(), LifecycleState::Stopped);
        assert!(service.local_addr().is_none());
        assert!(logger.contains(LogLevel::Info, "Server connection closed successfully."));
    }

    #[tokio::test]
    async fn test_close_without_listener_warns() {
        let logger = MemoryLogger::new();
        let mut service = ApiService::new();

        service.close(&logger).await.unwrap();

        assert!(logger.contains(LogLevel::Warn, "Server connection not found."));
        assert_eq!(service.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_init_twice_is_rejected() {
        let logger = Arc::new(MemoryLogger::new());
        let mut service = ApiService::new();
        service.init(init_options(Arc::clone(&logger))).await.unwrap();

        let err = service.init(init_options(Arc::clone(&logger))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to init the server: service is listening, expected stopped."
        );
        assert_eq!(service.state(), LifecycleState::Listening);

        service.close(logger.as_ref()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_init_returns_to_stopped() {
        let logger = Arc::new(MemoryLogger::new());
        let mut service = ApiService::new();

        let mut options = init_options(Arc::clone(&logger));
        options.api_doc = ApiDocSource::yaml("openapi: [not, a, document");

        let err = service.init(options).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to init the server: "));
        assert_eq!(service.state(), LifecycleState::Stopped);
        assert!(service.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_unknown_operation_fails_init() {
        let logger = Arc::new(MemoryLogger::new());
        let mut service = ApiService::new();

        let mut options = init_options(Arc::clone(&logger));
        options.app = options
            .app
            .operation("deleteUser", |_req| async { Ok(Reply::no_content()) });

        let err = service.init(options).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to init the server: handler registered for unknown operation 'deleteUser'."
        );
    }

    #[tokio::test]
    async fn test_serve_until_closes() {
        let logger = Arc::new(MemoryLogger::new());
        let mut service = ApiService::new();
        service.init(init_options(Arc::clone(&logger))).await.unwrap();

        service
            .serve_until(async {}, logger.as_ref())
            .await
            .unwrap();

        assert_eq!(service.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_from_config_requires_api_doc() {
        let err = ApiServiceInit::from_config(
            App::new(),
            Arc::new(MemoryLogger::new()),
            ApiaryConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to init the server: no API document configured."
        );
    }

    #[test]
    fn test_from_config_takes_port() {
        let mut config = ApiaryConfig::default();
        config.server.port = 8080;
        config.openapi.api_doc = Some("docs/api.yaml".to_string());

        let init = ApiServiceInit::from_config(App::new(), Arc::new(MemoryLogger::new()), config)
            .unwrap();
        assert_eq!(init.port, 8080);
        assert!(matches!(init.api_doc, ApiDocSource::File(_)));
    }
}

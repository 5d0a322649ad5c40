//! HTTP listener.
//!
//! Built on hyper's HTTP/1 connection driver and tokio. Every accepted
//! connection is spawned onto the runtime. Each request is buffered up to the
//! body limit, wrapped
//! in a fresh [`MiddlewareContext`], and run through the [`Pipeline`] with
//! the [`Dispatcher`] as its terminal handler.
//!
//! # Example
//!
//! ```rust,ignore
//! use apiary_server::{Dispatcher, Server};
//!
//! let listener = Server::new(pipeline, dispatcher)
//!     .shutdown_timeout(Duration::from_secs(10))
//!     .bind("127.0.0.1:0")
//!     .await?;
//!
//! println!("listening on {}", listener.local_addr());
//! listener.close().await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apiary_core::ApiError;
use apiary_middleware::stages::body_parser::DEFAULT_LIMIT_BYTES;
use apiary_middleware::stages::BodyParseError;
use apiary_middleware::{MiddlewareContext, Pipeline, Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::Dispatcher;
use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Default time `close` waits for open connections.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// An unbound server: the pipeline and the handlers it will serve.
#[derive(Debug)]
pub struct Server {
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<Dispatcher>,
    shutdown_timeout: Duration,
    body_limit: usize,
}

impl Server {
    /// Creates a server.
    #[must_use]
    pub fn new(pipeline: Pipeline, dispatcher: Dispatcher) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            dispatcher: Arc::new(dispatcher),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            body_limit: DEFAULT_LIMIT_BYTES,
        }
    }

    /// Sets how long [`Listener::close`] waits for open connections.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the largest request body read into memory. Reading stops at the
    /// limit and the request is rejected as a bad request.
    #[must_use]
    pub const fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Binds `addr` and starts accepting connections in the background.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(self, addr: &str) -> Result<Listener, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        info!(%local_addr, "listener bound");

        let shutdown = ShutdownSignal::new();
        let tracker = ConnectionTracker::new();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::new(self),
            shutdown.clone(),
            tracker.clone(),
        ));

        Ok(Listener {
            local_addr,
            shutdown,
            tracker,
            task,
        })
    }

    async fn handle(
        self: Arc<Self>,
        request: http::Request<Incoming>,
    ) -> Result<Response, Infallible> {
        let ctx = MiddlewareContext::for_request(&request);
        debug!(
            request_id = %ctx.request_id(),
            method = %request.method(),
            path = %request.uri().path(),
            "request received"
        );

        let (parts, body) = request.into_parts();
        let bytes = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                debug!(
                    request_id = %ctx.request_id(),
                    limit = self.body_limit,
                    "request body over limit"
                );
                let error = BodyParseError::TooLarge { limit: self.body_limit };
                return Ok(self.pipeline.reject(&ctx, error.into()));
            }
            Err(e) => {
                warn!(request_id = %ctx.request_id(), error = %e, "failed to read request body");
                let error = ApiError::bad_request_detail(format!("failed to read request body: {e}"));
                return Ok(self.pipeline.reject(&ctx, error.into()));
            }
        };
        let request: Request = http::Request::from_parts(parts, Full::new(bytes));

        let dispatcher = Arc::clone(&self.dispatcher);
        let response = self
            .pipeline
            .process(ctx, request, move |ctx, request| dispatcher.dispatch(ctx, request))
            .await;
        Ok(response)
    }
}

async fn accept_loop(
    listener: TcpListener,
    server: Arc<Server>,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
) -> Result<(), ServerError> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(server, stream, shutdown).await {
                                debug!(%remote_addr, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }

            () = shutdown.recv() => {
                info!("shutdown requested, no longer accepting connections");
                break;
            }
        }
    }

    // Stop accepting before draining.
    drop(listener);

    let active = tracker.active_connections();
    if active > 0 {
        info!(
            active,
            timeout_ms = u64::try_from(server.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for open connections"
        );
    }

    if tokio::time::timeout(server.shutdown_timeout, tracker.drained())
        .await
        .is_err()
    {
        let active = tracker.active_connections();
        warn!(active, "shutdown timeout reached");
        return Err(ServerError::ShutdownTimeout { active });
    }

    info!("listener stopped");
    Ok(())
}

async fn serve_connection(
    server: Arc<Server>,
    stream: TcpStream,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request| Arc::clone(&server).handle(request));

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            // Finish the in-flight request, then close.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

/// A bound, accepting listener.
#[derive(Debug)]
pub struct Listener {
    local_addr: SocketAddr,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
    task: JoinHandle<Result<(), ServerError>>,
}

impl Listener {
    /// Returns the bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    /// Stops accepting, lets open connections finish and waits for the
    /// accept loop to confirm.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ShutdownTimeout`] if connections outlive the
    /// shutdown timeout, or [`ServerError::Task`] if the loop itself failed.
    pub async fn close(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        self.task
            .await
            .map_err(|e| ServerError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{App, Reply};
    use apiary_middleware::stages::{ErrorNormalizationStage, OpenApiMiddleware, ResponseFinalizer};
    use apiary_openapi::{ApiContract, DocumentFormat, DocumentLoader};
    use apiary_telemetry::MemoryLogger;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const DOC: &str = r#"{
        "openapi": "3.0.3",
        "info": { "title": "Ping", "version": "1.0.0" },
        "paths": {
            "/ping": {
                "get": {
                    "operationId": "ping",
                    "responses": { "204": { "description": "pong" } }
                }
            }
        }
    }"#;

    fn server() -> Server {
        let document = DocumentLoader::parse(DOC, DocumentFormat::Json).unwrap();
        let contract = Arc::new(ApiContract::compile(&document).unwrap());
        let pipeline = Pipeline::builder()
            .router(OpenApiMiddleware::new(Arc::clone(&contract)))
            .unwrap()
            .error_normalizer(ErrorNormalizationStage::new())
            .unwrap()
            .finalizer(ResponseFinalizer::new(Arc::new(MemoryLogger::new())))
            .unwrap()
            .build()
            .unwrap();
        let app = App::new().operation("ping", |_req| async { Ok(Reply::no_content()) });
        Server::new(pipeline, Dispatcher::new(app, contract))
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = server().bind("127.0.0.1:0").await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        listener.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_serves_requests() {
        let listener = server().bind("127.0.0.1:0").await.unwrap();

        let response = raw_get(listener.local_addr(), "/ping").await;
        assert!(response.starts_with("HTTP/1.1 204"), "{response}");
        assert!(response.to_lowercase().contains("x-request-id:"));

        listener.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_route_is_error_envelope() {
        let listener = server().bind("127.0.0.1:0").await.unwrap();

        let response = raw_get(listener.local_addr(), "/nope").await;
        assert!(response.starts_with("HTTP/1.1 400"), "{response}");
        assert!(response.contains(r#""code":"BAD_REQUEST_ERROR""#));

        listener.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = server().bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().to_string();

        let err = server().bind(&addr).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));

        first.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_stops_accepting() {
        let listener = server().bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        listener.close().await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}

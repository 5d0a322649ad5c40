//! Handler registration and dispatch.
//!
//! An [`App`] maps `operationId`s from the API document to async handlers.
//! At request time the [`Dispatcher`] is the terminal stage of the pipeline:
//! it looks up the handler for the operation the router resolved, runs it,
//! validates the reply against the document and turns it into a response.
//!
//! # Example
//!
//! ```rust
//! use apiary_core::{ApiError, ErrorOptions};
//! use apiary_server::{App, Reply};
//! use http::StatusCode;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let app = App::new()
//!     .json("createUser", StatusCode::CREATED, |_req, user: NewUser| async move {
//!         if user.name == "root" {
//!             let detail = ErrorOptions::new().detail("User 'root' already exists.");
//!             return Err(anyhow::Error::from(ApiError::conflict(detail)));
//!         }
//!         Ok(User { id: 1, name: user.name })
//!     })
//!     .operation("health", |_req| async { Ok(Reply::no_content()) });
//!
//! assert!(app.contains("createUser"));
//! assert_eq!(app.len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use apiary_core::{ApiError, RequestId};
use apiary_middleware::{BoxFuture, MiddlewareContext, Request, Response, StageResult};
use apiary_openapi::ApiContract;
use apiary_telemetry::Logger;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::InitError;

/// Content type of JSON replies that do not set their own.
pub const DEFAULT_REPLY_CONTENT_TYPE: &str = "application/json";

/// What a handler sees of a request.
#[derive(Debug)]
pub struct HandlerRequest {
    /// The resolved operation.
    pub operation_id: String,
    /// Correlation ID of the request.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Path parameters by name, still as strings.
    pub path_params: HashMap<String, String>,
    /// Parsed JSON body, if the body parser accepted the content type.
    pub body: Option<Value>,
    /// The raw body bytes.
    pub raw_body: Bytes,
}

impl HandlerRequest {
    /// Returns a path parameter.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Returns the raw query string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns a header value if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A handler's successful outcome.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    body: Option<Value>,
    content_type: Option<String>,
    headers: HeaderMap,
}

impl Reply {
    /// A reply with no body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            content_type: None,
            headers: HeaderMap::new(),
        }
    }

    /// A JSON reply.
    #[must_use]
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(status)
        }
    }

    /// `200 OK` with a JSON body.
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::json(StatusCode::OK, body)
    }

    /// `201 Created` with a JSON body.
    #[must_use]
    pub fn created(body: Value) -> Self {
        Self::json(StatusCode::CREATED, body)
    }

    /// `204 No Content`.
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// Overrides the content type of the body.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Adds a response header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the JSON body.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Returns the content type set with [`with_content_type`](Self::with_content_type).
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn into_response(self) -> anyhow::Result<Response> {
        let mut builder = http::Response::builder().status(self.status);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers);
        }

        let body = match &self.body {
            Some(value) => {
                let content_type = self
                    .content_type
                    .as_deref()
                    .unwrap_or(DEFAULT_REPLY_CONTENT_TYPE);
                builder = builder.header(CONTENT_TYPE, content_type);
                Bytes::from(serde_json::to_vec(value)?)
            }
            None => Bytes::new(),
        };

        Ok(builder.body(Full::new(body))?)
    }
}

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Reply>>;

/// A type-erased handler.
pub type RawHandler = Arc<dyn Fn(HandlerRequest) -> HandlerFuture + Send + Sync>;

/// The application: handlers keyed by `operationId`.
#[derive(Clone, Default)]
pub struct App {
    handlers: HashMap<String, RawHandler>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut operations: Vec<_> = self.handlers.keys().collect();
        operations.sort();
        f.debug_struct("App").field("operations", &operations).finish()
    }
}

impl App {
    /// Creates an app with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler that works on the whole request and builds its own
    /// [`Reply`]. A later registration for the same operation replaces the
    /// earlier one.
    #[must_use]
    pub fn operation<F, Fut>(mut self, operation_id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
    {
        let handler: RawHandler =
            Arc::new(move |request: HandlerRequest| -> HandlerFuture { Box::pin(handler(request)) });
        self.handlers.insert(operation_id.into(), handler);
        self
    }

    /// Registers a typed JSON handler.
    ///
    /// The parsed body is deserialized into `Req` (a missing body reads as
    /// `null`). A body that does not fit raises a bad request carrying the
    /// serde message. The returned value is serialized with `status`.
    #[must_use]
    pub fn json<Req, Res, F, Fut>(
        self,
        operation_id: impl Into<String>,
        status: StatusCode,
        handler: F,
    ) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(HandlerRequest, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Res>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.operation(operation_id, move |mut request: HandlerRequest| {
            let handler = Arc::clone(&handler);
            async move {
                let body = request.body.take().unwrap_or(Value::Null);
                let input: Req = serde_json::from_value(body)
                    .map_err(|e| ApiError::bad_request_detail(e.to_string()))?;
                let output = handler(request, input).await?;
                Ok::<_, anyhow::Error>(Reply::json(status, serde_json::to_value(output)?))
            }
        })
    }

    /// Returns `true` if a handler is registered for the operation.
    #[must_use]
    pub fn contains(&self, operation_id: &str) -> bool {
        self.handlers.contains_key(operation_id)
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the registered operation IDs, sorted.
    #[must_use]
    pub fn operation_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    fn handler(&self, operation_id: &str) -> Option<RawHandler> {
        self.handlers.get(operation_id).cloned()
    }

    /// Binds the app to a contract.
    ///
    /// Every registered operation must exist in the contract. Declared
    /// operations without a handler are logged as warnings; requests to them
    /// fail with an internal error.
    pub(crate) fn bind(&self, contract: &ApiContract, logger: &dyn Logger) -> Result<(), InitError> {
        if let Some(unknown) = self
            .operation_ids()
            .into_iter()
            .find(|id| contract.operation(id).is_none())
        {
            return Err(InitError::UnknownOperation(unknown.to_string()));
        }

        for operation_id in contract.operation_ids() {
            if !self.contains(operation_id) {
                logger.warn(
                    &format!("No handler registered for operation '{operation_id}'."),
                    None,
                );
            }
        }
        Ok(())
    }
}

/// Terminal pipeline stage that runs the handler for the resolved operation.
#[derive(Debug)]
pub struct Dispatcher {
    app: App,
    contract: Arc<ApiContract>,
    validate_responses: bool,
}

impl Dispatcher {
    /// Creates a dispatcher. Response validation is on.
    #[must_use]
    pub fn new(app: App, contract: Arc<ApiContract>) -> Self {
        Self {
            app,
            contract,
            validate_responses: true,
        }
    }

    /// Turns response validation on or off.
    #[must_use]
    pub const fn validate_responses(mut self, enabled: bool) -> Self {
        self.validate_responses = enabled;
        self
    }

    /// Runs the handler for the operation recorded in `ctx`.
    ///
    /// The shape matches what [`Pipeline::process`](apiary_middleware::Pipeline::process)
    /// expects of its terminal handler.
    pub fn dispatch(
        self: &Arc<Self>,
        ctx: &mut MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'static, StageResult> {
        let this = Arc::clone(self);
        let operation_id = ctx.operation_id().map(str::to_string);
        let path_params = ctx.path_params().clone();
        let body = ctx.take_body();
        let request_id = ctx.request_id();

        Box::pin(async move {
            let operation_id = operation_id
                .ok_or_else(|| anyhow!("request reached the dispatcher without a resolved operation"))?;
            let handler = this
                .app
                .handler(&operation_id)
                .ok_or_else(|| anyhow!("no handler registered for operation '{operation_id}'"))?;

            let (parts, raw) = request.into_parts();
            let raw_body = raw.collect().await?.to_bytes();

            debug!(%request_id, operation_id = %operation_id, "dispatching to handler");

            let reply = handler(HandlerRequest {
                operation_id: operation_id.clone(),
                request_id,
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                path_params,
                body,
                raw_body,
            })
            .await?;

            if this.validate_responses {
                if let Some(operation) = this.contract.operation(&operation_id) {
                    operation.validate_response(
                        reply.status().as_u16(),
                        reply.content_type(),
                        reply.body(),
                    )?;
                }
            }

            reply.into_response()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_openapi::{DocumentFormat, DocumentLoader, HttpError};
    use apiary_telemetry::{LogLevel, MemoryLogger};
    use serde::Deserialize;
    use serde_json::json;

    const DOC: &str = r"
openapi: 3.0.3
info: { title: Users, version: 1.0.0 }
paths:
  /users:
    post:
      operationId: createUser
      responses:
        '201':
          description: created
          content:
            application/json:
              schema:
                type: object
                required: [id, name]
                properties:
                  id: { type: integer }
                  name: { type: string }
  /users/{userId}:
    delete:
      operationId: deleteUser
      parameters:
        - { name: userId, in: path, required: true, schema: { type: string } }
      responses:
        '204': { description: deleted }
";

    fn contract() -> Arc<ApiContract> {
        let document = DocumentLoader::parse(DOC, DocumentFormat::Yaml).unwrap();
        Arc::new(ApiContract::compile(&document).unwrap())
    }

    #[derive(Deserialize)]
    struct NewUser {
        name: String,
    }

    fn app() -> App {
        App::new()
            .json("createUser", StatusCode::CREATED, |_req, user: NewUser| async move {
                Ok(json!({ "id": 1, "name": user.name }))
            })
            .operation("deleteUser", |req| async move {
                assert_eq!(req.path_param("userId"), Some("7"));
                Ok(Reply::no_content())
            })
    }

    fn context(operation_id: &str, body: Option<Value>) -> MiddlewareContext {
        let mut ctx = MiddlewareContext::new();
        ctx.set_operation_id(operation_id.to_string());
        if let Some(body) = body {
            ctx.set_body(body);
            ctx.set_has_body(true);
        }
        ctx
    }

    fn empty_request() -> Request {
        http::Request::new(Full::new(Bytes::new()))
    }

    #[tokio::test]
    async fn test_typed_handler_round_trip() {
        let dispatcher = Arc::new(Dispatcher::new(app(), contract()));
        let mut ctx = context("createUser", Some(json!({ "name": "Ada" })));

        let response = dispatcher.dispatch(&mut ctx, empty_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "id": 1, "name": "Ada" }));
    }

    #[tokio::test]
    async fn test_typed_handler_rejects_wrong_shape() {
        let dispatcher = Arc::new(Dispatcher::new(app(), contract()));
        let mut ctx = context("createUser", Some(json!({ "nom": "Ada" })));

        let err = dispatcher.dispatch(&mut ctx, empty_request()).await.unwrap_err();
        let api = err.downcast_ref::<ApiError>().expect("typed body errors are ApiErrors");
        assert_eq!(api.status().as_u16(), 400);
        assert!(api.detail().contains("missing field `name`"));
    }

    #[tokio::test]
    async fn test_path_params_reach_handler() {
        let dispatcher = Arc::new(Dispatcher::new(app(), contract()));
        let mut ctx = context("deleteUser", None);
        ctx.set_path_params(HashMap::from([("userId".to_string(), "7".to_string())]));

        let response = dispatcher.dispatch(&mut ctx, empty_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_invalid_response_rejected() {
        let app = App::new().operation("createUser", |_req| async {
            Ok(Reply::created(json!({ "id": "one" })))
        });
        let dispatcher = Arc::new(Dispatcher::new(app, contract()));
        let mut ctx = context("createUser", None);

        let err = dispatcher.dispatch(&mut ctx, empty_request()).await.unwrap_err();
        assert!(err.downcast_ref::<HttpError>().is_some());
    }

    #[tokio::test]
    async fn test_undeclared_status_rejected() {
        let app = App::new().operation("createUser", |_req| async {
            Ok(Reply::ok(json!({ "id": 1, "name": "Ada" })))
        });
        let dispatcher = Arc::new(Dispatcher::new(app, contract()));
        let mut ctx = context("createUser", None);

        let err = dispatcher.dispatch(&mut ctx, empty_request()).await.unwrap_err();
        let http_error = err.downcast_ref::<HttpError>().unwrap();
        assert_eq!(
            http_error.message(),
            "no schema defined for status code '200' in the openapi spec"
        );
    }

    #[tokio::test]
    async fn test_response_validation_can_be_disabled() {
        let app = App::new().operation("createUser", |_req| async {
            Ok(Reply::ok(json!({ "anything": true })))
        });
        let dispatcher = Arc::new(Dispatcher::new(app, contract()).validate_responses(false));
        let mut ctx = context("createUser", None);

        let response = dispatcher.dispatch(&mut ctx, empty_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_handler_is_internal_error() {
        let dispatcher = Arc::new(Dispatcher::new(App::new(), contract()));
        let mut ctx = context("deleteUser", None);

        let err = dispatcher.dispatch(&mut ctx, empty_request()).await.unwrap_err();
        assert!(err.downcast_ref::<ApiError>().is_none());
        assert!(err.to_string().contains("deleteUser"));
    }

    #[test]
    fn test_bind_rejects_unknown_operation() {
        let app = app().operation("listOrders", |_req| async { Ok(Reply::no_content()) });
        let logger = MemoryLogger::new();

        let err = app.bind(&contract(), &logger).unwrap_err();
        assert!(matches!(err, InitError::UnknownOperation(ref id) if id == "listOrders"));
    }

    #[test]
    fn test_bind_warns_about_unhandled_operations() {
        let app = App::new().operation("createUser", |_req| async { Ok(Reply::no_content()) });
        let logger = MemoryLogger::new();

        app.bind(&contract(), &logger).unwrap();
        assert!(logger.contains(
            LogLevel::Warn,
            "No handler registered for operation 'deleteUser'."
        ));
    }

    #[test]
    fn test_reply_headers() {
        let reply = Reply::created(json!({}))
            .with_content_type("application/vnd.api+json")
            .with_header(http::header::LOCATION, HeaderValue::from_static("/users/1"));

        let response = reply.into_response().unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/vnd.api+json");
        assert_eq!(response.headers()[http::header::LOCATION], "/users/1");
    }
}

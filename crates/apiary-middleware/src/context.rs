//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline:
//! the parsed body, the resolved operation, and headers that must be applied
//! to whatever response is finally sent, including error responses.

use apiary_core::RequestId;
use http::HeaderMap;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

/// Header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use apiary_middleware::context::MiddlewareContext;
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.set_operation_id("getUser".to_string());
///
/// assert_eq!(ctx.operation_id(), Some("getUser"));
/// assert!(ctx.body().is_none());
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// The operation the router resolved.
    operation_id: Option<String>,

    /// Values of templated path segments.
    path_params: HashMap<String, String>,

    /// Body parsed by the body parser.
    body: Option<Value>,

    /// Whether the request carried any body bytes.
    has_body: bool,

    /// Headers added to the final response.
    response_headers: HeaderMap,

    /// When the request started processing.
    started_at: Instant,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            operation_id: None,
            path_params: HashMap::new(),
            body: None,
            has_body: false,
            response_headers: HeaderMap::new(),
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Creates a context for `request`, reusing a valid `x-request-id`
    /// header when the client sent one.
    #[must_use]
    pub fn for_request<B>(request: &http::Request<B>) -> Self {
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse)
            .map_or_else(Self::new, Self::with_request_id)
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the operation ID, if resolved.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Sets the operation ID.
    ///
    /// This is set after routing resolves the path to an operation.
    pub fn set_operation_id(&mut self, operation_id: String) {
        self.operation_id = Some(operation_id);
    }

    /// Returns the path parameters extracted by the router.
    #[must_use]
    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// Sets the path parameters.
    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    /// Returns the parsed body, if the body parser parsed one.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Stores the parsed body.
    pub fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    /// Removes and returns the parsed body.
    pub fn take_body(&mut self) -> Option<Value> {
        self.body.take()
    }

    /// Returns `true` if the request carried body bytes.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.has_body
    }

    /// Records whether the request carried body bytes.
    pub fn set_has_body(&mut self, has_body: bool) {
        self.has_body = has_body;
    }

    /// Returns headers that will be added to the final response.
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Returns the final-response headers for modification.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use apiary_middleware::context::MiddlewareContext;
    ///
    /// struct Tenant(&'static str);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(Tenant("acme"));
    ///
    /// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

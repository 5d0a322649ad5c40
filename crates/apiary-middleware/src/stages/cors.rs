//! CORS (Cross-Origin Resource Sharing) middleware.
//!
//! Answers preflight `OPTIONS` requests with 204 and records CORS headers in
//! the context, so the pipeline applies them to every response it sends,
//! including error responses built by the finalizer.
//!
//! ## Example
//!
//! ```
//! use apiary_middleware::stages::CorsMiddleware;
//! use http::Method;
//! use std::time::Duration;
//!
//! let cors = CorsMiddleware::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_methods([Method::GET, Method::POST])
//!     .allow_headers(["Content-Type", "Authorization"])
//!     .allow_credentials(true)
//!     .max_age(Duration::from_secs(3600))
//!     .build();
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt, StageResult};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::collections::BTreeSet;
use std::time::Duration;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// CORS middleware.
///
/// The default policy is permissive: any origin, the common methods, and
/// whatever headers the preflight asks for.
#[derive(Debug, Clone, Default)]
pub struct CorsMiddleware {
    config: CorsConfig,
}

/// Configuration for [`CorsMiddleware`].
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allowed_origins: AllowedOrigins,
    allowed_methods: Vec<Method>,
    /// Empty means the preflight's requested headers are echoed back.
    allowed_headers: BTreeSet<String>,
    expose_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

/// The set of allowed origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Only the listed origins.
    List(BTreeSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    /// Returns the `Access-Control-Allow-Origin` value for a request origin.
    #[must_use]
    pub fn header_value(&self, origin: Option<&str>) -> Option<HeaderValue> {
        match self {
            Self::Any => Some(HeaderValue::from_static("*")),
            Self::List(origins) => origin
                .filter(|o| origins.contains(*o))
                .and_then(|o| HeaderValue::from_str(o).ok()),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::Any,
            allowed_methods: vec![
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ],
            allowed_headers: BTreeSet::new(),
            expose_headers: BTreeSet::new(),
            allow_credentials: false,
            max_age: None,
        }
    }
}

/// Builder for [`CorsMiddleware`].
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    config: CorsConfig,
}

impl CorsBuilder {
    /// Creates a builder with the permissive defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows any origin.
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.config.allowed_origins = AllowedOrigins::Any;
        self
    }

    /// Adds an allowed origin, switching away from "any origin".
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        match &mut self.config.allowed_origins {
            AllowedOrigins::Any => {
                self.config.allowed_origins = AllowedOrigins::List(BTreeSet::from([origin.into()]));
            }
            AllowedOrigins::List(origins) => {
                origins.insert(origin.into());
            }
        }
        self
    }

    /// Sets the allowed origins. A `*` entry allows any origin.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: BTreeSet<String> = origins.into_iter().map(Into::into).collect();
        self.config.allowed_origins = if origins.contains("*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        };
        self
    }

    /// Sets the allowed HTTP methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.config.allowed_methods = methods.into_iter().collect();
        self
    }

    /// Sets the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_headers = headers
            .into_iter()
            .map(|h| h.into().to_lowercase())
            .collect();
        self
    }

    /// Sets headers exposed to browser scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.expose_headers = headers
            .into_iter()
            .map(|h| h.into().to_lowercase())
            .collect();
        self
    }

    /// Sets whether credentials are allowed.
    #[must_use]
    pub const fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.allow_credentials = allow;
        self
    }

    /// Sets how long browsers may cache a preflight answer.
    #[must_use]
    pub const fn max_age(mut self, duration: Duration) -> Self {
        self.config.max_age = Some(duration);
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> CorsMiddleware {
        CorsMiddleware {
            config: self.config,
        }
    }
}

impl CorsMiddleware {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CorsConfig {
        &self.config
    }

    fn origin(request: &Request) -> Option<&str> {
        request
            .headers()
            .get(headers::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    /// Headers sent on every response.
    fn simple_headers(&self, origin: Option<&str>, target: &mut HeaderMap) {
        let Some(allow_origin) = self.config.allowed_origins.header_value(origin) else {
            return;
        };
        target.insert(headers::ALLOW_ORIGIN, allow_origin);

        if self.config.allowed_origins != AllowedOrigins::Any {
            target.append(headers::VARY, HeaderValue::from_static("Origin"));
        }

        if self.config.allow_credentials {
            target.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }

        if !self.config.expose_headers.is_empty() {
            let joined = join(self.config.expose_headers.iter().map(String::as_str));
            if let Ok(value) = HeaderValue::from_str(&joined) {
                target.insert(headers::EXPOSE_HEADERS, value);
            }
        }
    }

    fn preflight_response(&self, request: &Request) -> Response {
        let mut response = Response::empty(StatusCode::NO_CONTENT);
        let origin = Self::origin(request);
        let target = response.headers_mut();

        self.simple_headers(origin, target);
        if !target.contains_key(headers::ALLOW_ORIGIN) {
            return response;
        }

        let methods = join(self.config.allowed_methods.iter().map(Method::as_str));
        if let Ok(value) = HeaderValue::from_str(&methods) {
            target.insert(headers::ALLOW_METHODS, value);
        }

        if self.config.allowed_headers.is_empty() {
            if let Some(requested) = request.headers().get(headers::REQUEST_HEADERS) {
                target.insert(headers::ALLOW_HEADERS, requested.clone());
                target.append(
                    headers::VARY,
                    HeaderValue::from_static("Access-Control-Request-Headers"),
                );
            }
        } else {
            let allowed = join(self.config.allowed_headers.iter().map(String::as_str));
            if let Ok(value) = HeaderValue::from_str(&allowed) {
                target.insert(headers::ALLOW_HEADERS, value);
            }
        }

        if let Some(max_age) = self.config.max_age {
            if let Ok(value) = HeaderValue::from_str(&max_age.as_secs().to_string()) {
                target.insert(headers::MAX_AGE, value);
            }
        }

        response
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(",")
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            if request.method() == Method::OPTIONS {
                return Ok(self.preflight_response(&request));
            }

            self.simple_headers(Self::origin(&request), ctx.response_headers_mut());
            next.run(ctx, request).await
        })
    }
}

//! JSON body parsing.
//!
//! Bodies whose content type is in the configured list are parsed into a
//! [`serde_json::Value`] and stored in the context. Other bodies pass
//! through untouched.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, StageResult};
use apiary_openapi::media_type_essence;
use bytes::Bytes;
use http::header;
use http_body_util::{BodyExt, Full};
use thiserror::Error;
use tracing::debug;

/// Content type parsed by default.
pub const DEFAULT_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Default body size limit, 100 KiB.
pub const DEFAULT_LIMIT_BYTES: usize = 100 * 1024;

/// A body the parser could not accept.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BodyParseError {
    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    Malformed(String),

    /// The body is larger than the configured limit.
    #[error("request entity too large: the body exceeds the {limit} byte limit")]
    TooLarge {
        /// Configured limit.
        limit: usize,
    },
}

/// Parses JSON bodies of the configured content types.
#[derive(Debug, Clone)]
pub struct BodyParserMiddleware {
    content_types: Vec<String>,
    limit_bytes: usize,
}

impl Default for BodyParserMiddleware {
    fn default() -> Self {
        Self::new([DEFAULT_CONTENT_TYPE], DEFAULT_LIMIT_BYTES)
    }
}

impl BodyParserMiddleware {
    /// Creates a parser for the given content types and size limit.
    pub fn new<I, S>(content_types: I, limit_bytes: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            content_types: content_types
                .into_iter()
                .map(|ct| media_type_essence(ct.as_ref()))
                .collect(),
            limit_bytes,
        }
    }

    /// Returns the size limit.
    #[must_use]
    pub const fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    fn accepts(&self, request: &Request) -> bool {
        request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type_essence)
            .is_some_and(|essence| self.content_types.iter().any(|ct| *ct == essence))
    }

    fn parse(&self, bytes: &Bytes) -> Result<serde_json::Value, BodyParseError> {
        if bytes.len() > self.limit_bytes {
            return Err(BodyParseError::TooLarge { limit: self.limit_bytes });
        }
        serde_json::from_slice(bytes).map_err(|e| BodyParseError::Malformed(e.to_string()))
    }
}

impl Middleware for BodyParserMiddleware {
    fn name(&self) -> &'static str {
        "body_parser"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let bytes = body.collect().await?.to_bytes();
            let request = Request::from_parts(parts, Full::new(bytes.clone()));

            ctx.set_has_body(!bytes.is_empty());
            if !bytes.is_empty() && self.accepts(&request) {
                let value = self.parse(&bytes)?;
                debug!(bytes = bytes.len(), "request body parsed");
                ctx.set_body(value);
            }

            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Response, ResponseExt};
    use http::StatusCode;
    use serde_json::json;

    fn request(content_type: &str, body: &'static str) -> Request {
        http::Request::builder()
            .method("POST")
            .uri("/users")
            .header(header::CONTENT_TYPE, content_type)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    fn ok<'a>() -> Next<'a> {
        Next::handler(|_ctx, _req| Box::pin(async { Ok(Response::empty(StatusCode::OK)) }))
    }

    #[tokio::test]
    async fn test_parses_configured_content_type() {
        let parser = BodyParserMiddleware::default();
        let mut ctx = MiddlewareContext::new();

        parser
            .process(
                &mut ctx,
                request("application/vnd.api+json; charset=utf-8", r#"{"name":"Ada"}"#),
                ok(),
            )
            .await
            .unwrap();

        assert!(ctx.has_body());
        assert_eq!(ctx.body(), Some(&json!({ "name": "Ada" })));
    }

    #[tokio::test]
    async fn test_skips_other_content_types() {
        let parser = BodyParserMiddleware::default();
        let mut ctx = MiddlewareContext::new();

        parser
            .process(&mut ctx, request("text/plain", "hello"), ok())
            .await
            .unwrap();

        assert!(ctx.has_body());
        assert!(ctx.body().is_none());
    }

    #[tokio::test]
    async fn test_body_is_kept_for_downstream() {
        let parser = BodyParserMiddleware::default();
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(|_ctx, req: Request| {
            Box::pin(async move {
                let bytes = req.into_body().collect().await?.to_bytes();
                assert_eq!(&bytes[..], b"hello");
                Ok(Response::empty(StatusCode::OK))
            })
        });

        parser
            .process(&mut ctx, request("text/plain", "hello"), next)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let parser = BodyParserMiddleware::default();
        let mut ctx = MiddlewareContext::new();

        let err = parser
            .process(&mut ctx, request(DEFAULT_CONTENT_TYPE, "{ nope"), ok())
            .await
            .unwrap_err();

        let err = err.downcast_ref::<BodyParseError>().unwrap();
        assert!(matches!(err, BodyParseError::Malformed(_)));
        assert!(err.to_string().starts_with("invalid JSON body: "));
    }

    #[tokio::test]
    async fn test_size_limit() {
        let parser = BodyParserMiddleware::new(["application/json"], 8);
        let mut ctx = MiddlewareContext::new();

        let err = parser
            .process(&mut ctx, request("application/json", r#"{"name":"Ada"}"#), ok())
            .await
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<BodyParseError>(),
            Some(&BodyParseError::TooLarge { limit: 8 })
        );
    }

    #[tokio::test]
    async fn test_empty_body() {
        let parser = BodyParserMiddleware::default();
        let mut ctx = MiddlewareContext::new();

        parser
            .process(&mut ctx, request(DEFAULT_CONTENT_TYPE, ""), ok())
            .await
            .unwrap();

        assert!(!ctx.has_body());
        assert!(ctx.body().is_none());
    }
}

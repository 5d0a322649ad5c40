//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// What a request stage or handler produces: a response, or any raised error.
///
/// Errors travel as `anyhow::Error` until the error stages and the
/// response finalizer turn them into a response.
pub type StageResult = Result<Response, anyhow::Error>;

/// Content type of error responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Extension trait for building responses without fallible builders.
pub trait ResponseExt {
    /// Creates a response with the given status and an empty body.
    fn empty(status: StatusCode) -> Response;

    /// Creates a response with the given status, content type and body.
    fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response;
}

impl ResponseExt for Response {
    fn empty(status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response {
        let mut response = http::Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_response() {
        let response = Response::empty(StatusCode::NO_CONTENT);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_response_with_body() {
        let response = Response::with_body(StatusCode::CONFLICT, JSON_CONTENT_TYPE, "{}");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}

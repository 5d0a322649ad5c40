//! Route resolution.
//!
//! Maps an HTTP method and request path to the operation declared for it,
//! extracting templated path segments as parameters.

use std::borrow::Cow;
use std::collections::HashMap;

use http::Method;
use regex::Regex;
use tracing::debug;

use crate::error::{HttpError, OpenApiError, OpenApiResult};

/// A resolved route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// The matched operation.
    pub operation_id: String,
    /// The path template that matched (e.g. `/users/{userId}`).
    pub path_template: String,
    /// Raw values of templated segments.
    pub path_params: HashMap<String, String>,
}

#[derive(Debug)]
struct CompiledRoute {
    template: String,
    pattern: Regex,
    param_names: Vec<String>,
    operation_id: String,
}

/// Resolves requests to operation IDs.
///
/// Literal segments win over templated ones: `/users/me` is tried before
/// `/users/{userId}`.
///
/// # Example
///
/// ```
/// use apiary_openapi::RouteResolver;
/// use http::Method;
///
/// let mut resolver = RouteResolver::new("");
/// resolver.add_route(Method::GET, "/users/{userId}", "getUser").unwrap();
///
/// let matched = resolver.resolve(&Method::GET, "/users/42").unwrap();
/// assert_eq!(matched.operation_id, "getUser");
/// assert_eq!(matched.path_params["userId"], "42");
/// ```
#[derive(Debug, Default)]
pub struct RouteResolver {
    base_path: String,
    routes: HashMap<Method, Vec<CompiledRoute>>,
}

impl RouteResolver {
    /// Creates an empty resolver. Requests must start with `base_path`.
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            routes: HashMap::new(),
        }
    }

    /// Adds a route.
    pub fn add_route(
        &mut self,
        method: Method,
        template: &str,
        operation_id: &str,
    ) -> OpenApiResult<()> {
        let (pattern, param_names) = compile_path(template)?;
        let routes = self.routes.entry(method).or_default();
        routes.push(CompiledRoute {
            template: template.to_string(),
            pattern,
            param_names,
            operation_id: operation_id.to_string(),
        });
        routes.sort_by(|a, b| route_specificity(&a.template, &b.template));
        Ok(())
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Returns `true` if no route was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a request.
    ///
    /// # Errors
    ///
    /// [`HttpError::method_not_allowed`] when the path exists for other
    /// methods only, [`HttpError::not_found`] when it does not exist at all.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, HttpError> {
        let Some(path) = self.strip_base(path) else {
            return Err(HttpError::not_found());
        };

        if let Some(found) = self
            .routes
            .get(method)
            .and_then(|routes| Self::match_routes(routes, path))
        {
            debug!(operation_id = %found.operation_id, "route resolved");
            return Ok(found);
        }

        let other_method = self
            .routes
            .iter()
            .filter(|(m, _)| *m != method)
            .any(|(_, routes)| Self::match_routes(routes, path).is_some());

        if other_method {
            Err(HttpError::method_not_allowed(method.as_str()))
        } else {
            Err(HttpError::not_found())
        }
    }

    fn strip_base<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.base_path.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(self.base_path.as_str()) {
            Some("") => Some("/"),
            Some(rest) if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    fn match_routes(routes: &[CompiledRoute], path: &str) -> Option<RouteMatch> {
        routes.iter().find_map(|route| {
            let captures = route.pattern.captures(path)?;
            let path_params = route
                .param_names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    captures
                        .get(i + 1)
                        .map(|value| (name.clone(), decode_segment(value.as_str())))
                })
                .collect();

            Some(RouteMatch {
                operation_id: route.operation_id.clone(),
                path_template: route.template.clone(),
                path_params,
            })
        })
    }
}

/// Percent-decodes a path segment. `+` is literal in paths. A segment that
/// does not decode to UTF-8 is kept as sent.
fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned)
}

fn compile_path(template: &str) -> OpenApiResult<(Regex, Vec<String>)> {
    if template == "/" {
        let regex = Regex::new("^/$").map_err(|e| invalid_template(template, &e))?;
        return Ok((regex, Vec::new()));
    }

    let mut pattern = String::from("^");
    let mut param_names = Vec::new();

    for segment in template.split('/').filter(|s| !s.is_empty()) {
        pattern.push('/');

        if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            param_names.push(name.to_string());
            pattern.push_str("([^/]+)");
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    pattern.push_str("/?$");

    let regex = Regex::new(&pattern).map_err(|e| invalid_template(template, &e))?;
    Ok((regex, param_names))
}

fn invalid_template(template: &str, error: &regex::Error) -> OpenApiError {
    OpenApiError::InvalidDocument {
        errors: vec![format!("path '{template}' cannot be compiled: {error}")],
    }
}

/// Fewer templated segments first; among equals, longer templates first.
fn route_specificity(a: &str, b: &str) -> std::cmp::Ordering {
    let a_params = a.matches('{').count();
    let b_params = b.matches('{').count();

    if a_params != b_params {
        return a_params.cmp(&b_params);
    }

    b.len().cmp(&a.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpErrorKind;

    fn resolver() -> RouteResolver {
        let mut resolver = RouteResolver::new("");
        resolver.add_route(Method::GET, "/users", "listUsers").unwrap();
        resolver.add_route(Method::POST, "/users", "createUser").unwrap();
        resolver.add_route(Method::GET, "/users/{userId}", "getUser").unwrap();
        resolver.add_route(Method::GET, "/users/me", "getCurrentUser").unwrap();
        resolver
            .add_route(Method::GET, "/users/{userId}/orders/{orderId}", "getUserOrder")
            .unwrap();
        resolver
    }

    #[test]
    fn test_resolve_literal_path() {
        let matched = resolver().resolve(&Method::GET, "/users").unwrap();
        assert_eq!(matched.operation_id, "listUsers");
        assert!(matched.path_params.is_empty());
    }

    #[test]
    fn test_resolve_by_method() {
        let matched = resolver().resolve(&Method::POST, "/users").unwrap();
        assert_eq!(matched.operation_id, "createUser");
    }

    #[test]
    fn test_literal_beats_template() {
        let matched = resolver().resolve(&Method::GET, "/users/me").unwrap();
        assert_eq!(matched.operation_id, "getCurrentUser");

        let matched = resolver().resolve(&Method::GET, "/users/42").unwrap();
        assert_eq!(matched.operation_id, "getUser");
        assert_eq!(matched.path_params["userId"], "42");
    }

    #[test]
    fn test_path_params_are_decoded() {
        let matched = resolver()
            .resolve(&Method::GET, "/users/john%20doe+jr")
            .unwrap();
        assert_eq!(matched.path_params["userId"], "john doe+jr");

        let matched = resolver().resolve(&Method::GET, "/users/%FF").unwrap();
        assert_eq!(matched.path_params["userId"], "%FF");
    }

    #[test]
    fn test_multiple_params() {
        let matched = resolver()
            .resolve(&Method::GET, "/users/7/orders/99")
            .unwrap();
        assert_eq!(matched.path_template, "/users/{userId}/orders/{orderId}");
        assert_eq!(matched.path_params["userId"], "7");
        assert_eq!(matched.path_params["orderId"], "99");
    }

    #[test]
    fn test_trailing_slash() {
        let matched = resolver().resolve(&Method::GET, "/users/").unwrap();
        assert_eq!(matched.operation_id, "listUsers");
    }

    #[test]
    fn test_not_found() {
        let err = resolver().resolve(&Method::GET, "/accounts").unwrap_err();
        assert_eq!(err.kind(), HttpErrorKind::NotFound);
        assert_eq!(err.to_string(), "not found");
    }

    #[test]
    fn test_method_not_allowed() {
        let err = resolver().resolve(&Method::DELETE, "/users").unwrap_err();
        assert_eq!(err.kind(), HttpErrorKind::MethodNotAllowed);
        assert_eq!(err.to_string(), "DELETE method not allowed");
    }

    #[test]
    fn test_base_path() {
        let mut resolver = RouteResolver::new("/v1");
        resolver.add_route(Method::GET, "/users", "listUsers").unwrap();
        resolver.add_route(Method::GET, "/", "root").unwrap();

        assert_eq!(
            resolver.resolve(&Method::GET, "/v1/users").unwrap().operation_id,
            "listUsers"
        );
        assert_eq!(resolver.resolve(&Method::GET, "/v1").unwrap().operation_id, "root");
        assert!(resolver.resolve(&Method::GET, "/users").is_err());
        assert!(resolver.resolve(&Method::GET, "/v1users").is_err());
    }

    #[test]
    fn test_len() {
        assert_eq!(resolver().len(), 5);
        assert!(RouteResolver::new("").is_empty());
    }
}

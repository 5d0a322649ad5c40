//! OpenAPI 3.x document model.
//!
//! Only the parts routing and validation read are modelled. Schemas stay as
//! raw JSON and are handed to the schema validator untouched. Unknown fields
//! (including `x-` extensions) are ignored.

use http::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OpenApiError, OpenApiResult};

/// An OpenAPI 3.x document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenApiDocument {
    /// OpenAPI version (e.g. "3.0.3", "3.1.0").
    pub openapi: String,

    /// API metadata.
    pub info: Info,

    /// Server list. The path of the first URL becomes the base path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,

    /// Path templates and their operations.
    #[serde(default)]
    pub paths: IndexMap<String, PathItem>,

    /// Reusable components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

/// API metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Info {
    /// API title.
    pub title: String,

    /// API version.
    pub version: String,

    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A server entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    /// Server URL, absolute or relative (`/api/v1`).
    pub url: String,

    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Either an inline value or a `$ref` to one in `components`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReferenceOr<T> {
    /// A reference such as `#/components/parameters/Limit`.
    Reference {
        /// The reference string.
        #[serde(rename = "$ref")]
        reference: String,
    },
    /// An inline value.
    Item(T),
}

/// Operations available on one path template.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathItem {
    /// GET operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,

    /// PUT operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,

    /// POST operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,

    /// DELETE operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,

    /// OPTIONS operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,

    /// HEAD operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,

    /// PATCH operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,

    /// TRACE operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Operation>,

    /// Parameters shared by every operation on this path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ReferenceOr<Parameter>>,
}

impl PathItem {
    /// Iterates the operations declared on this path with their methods.
    pub fn operations(&self) -> impl Iterator<Item = (Method, &Operation)> {
        [
            (Method::GET, self.get.as_ref()),
            (Method::PUT, self.put.as_ref()),
            (Method::POST, self.post.as_ref()),
            (Method::DELETE, self.delete.as_ref()),
            (Method::OPTIONS, self.options.as_ref()),
            (Method::HEAD, self.head.as_ref()),
            (Method::PATCH, self.patch.as_ref()),
            (Method::TRACE, self.trace.as_ref()),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.map(|op| (method, op)))
    }
}

/// A single API operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    /// Unique operation identifier. Handlers are bound by this value.
    #[serde(
        default,
        rename = "operationId",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_id: Option<String>,

    /// Short summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Whether the operation is deprecated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,

    /// Operation parameters. These override path-level parameters with the
    /// same name and location.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ReferenceOr<Parameter>>,

    /// Request body.
    #[serde(
        default,
        rename = "requestBody",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_body: Option<ReferenceOr<RequestBody>>,

    /// Responses keyed by status code, status range (`2XX`) or `default`.
    #[serde(default)]
    pub responses: IndexMap<String, ReferenceOr<Response>>,
}

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParameterIn {
    /// Path segment.
    Path,
    /// Query string.
    Query,
    /// Request header.
    Header,
    /// Cookie.
    Cookie,
}

impl ParameterIn {
    /// Returns the location name used in validation messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "headers",
            Self::Cookie => "cookies",
        }
    }
}

/// An operation parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,

    /// Location.
    #[serde(rename = "in")]
    pub location: ParameterIn,

    /// Whether the parameter must be present. Path parameters always are.
    #[serde(default)]
    pub required: bool,

    /// Value schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// A request body declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestBody {
    /// Whether a body must be sent.
    #[serde(default)]
    pub required: bool,

    /// Accepted media types.
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

/// A media type entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaType {
    /// Body schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// A response declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Description.
    #[serde(default)]
    pub description: String,

    /// Response media types.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub content: IndexMap<String, MediaType>,
}

/// Reusable components.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Components {
    /// Named schemas, referenced as `#/components/schemas/<name>`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub schemas: IndexMap<String, Value>,

    /// Named parameters.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Parameter>,

    /// Named request bodies.
    #[serde(
        default,
        rename = "requestBodies",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub request_bodies: IndexMap<String, RequestBody>,

    /// Named responses.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub responses: IndexMap<String, Response>,
}

fn lookup<'a, T>(
    reference: &str,
    section: &str,
    entries: Option<&'a IndexMap<String, T>>,
) -> OpenApiResult<&'a T> {
    reference
        .strip_prefix("#/components/")
        .and_then(|rest| rest.strip_prefix(section))
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|name| entries.and_then(|entries| entries.get(name)))
        .ok_or_else(|| OpenApiError::UnresolvedReference(reference.to_string()))
}

impl OpenApiDocument {
    /// Returns the base path taken from the first server URL, without a
    /// trailing slash. Empty when no server is declared or the URL has no path.
    #[must_use]
    pub fn base_path(&self) -> String {
        let Some(server) = self.servers.first() else {
            return String::new();
        };
        let url = server.url.as_str();
        let path = match url.find("://") {
            Some(scheme_end) => {
                let rest = &url[scheme_end + 3..];
                rest.find('/').map_or("", |slash| &rest[slash..])
            }
            None => url,
        };
        path.trim_end_matches('/').to_string()
    }

    /// Resolves a parameter that may be a reference.
    pub fn resolve_parameter<'a>(
        &'a self,
        parameter: &'a ReferenceOr<Parameter>,
    ) -> OpenApiResult<&'a Parameter> {
        match parameter {
            ReferenceOr::Item(item) => Ok(item),
            ReferenceOr::Reference { reference } => lookup(
                reference,
                "parameters",
                self.components.as_ref().map(|c| &c.parameters),
            ),
        }
    }

    /// Resolves a request body that may be a reference.
    pub fn resolve_request_body<'a>(
        &'a self,
        body: &'a ReferenceOr<RequestBody>,
    ) -> OpenApiResult<&'a RequestBody> {
        match body {
            ReferenceOr::Item(item) => Ok(item),
            ReferenceOr::Reference { reference } => lookup(
                reference,
                "requestBodies",
                self.components.as_ref().map(|c| &c.request_bodies),
            ),
        }
    }

    /// Resolves a response that may be a reference.
    pub fn resolve_response<'a>(
        &'a self,
        response: &'a ReferenceOr<Response>,
    ) -> OpenApiResult<&'a Response> {
        match response {
            ReferenceOr::Item(item) => Ok(item),
            ReferenceOr::Reference { reference } => lookup(
                reference,
                "responses",
                self.components.as_ref().map(|c| &c.responses),
            ),
        }
    }

    /// Returns the named schemas as a JSON object, for `$ref` resolution.
    #[must_use]
    pub fn schema_components(&self) -> Value {
        let schemas = self
            .components
            .as_ref()
            .map(|c| c.schemas.clone().into_iter().collect())
            .unwrap_or_default();
        serde_json::json!({ "schemas": Value::Object(schemas) })
    }

    /// Iterates every operation as `(path template, method, operation)`.
    pub fn operations(&self) -> impl Iterator<Item = (&str, Method, &Operation)> {
        self.paths.iter().flat_map(|(path, item)| {
            item.operations()
                .map(move |(method, op)| (path.as_str(), method, op))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> OpenApiDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deserialize_minimal() {
        let doc = document(json!({
            "openapi": "3.0.3",
            "info": { "title": "Users", "version": "1.0.0" },
            "paths": {
                "/users": {
                    "get": { "operationId": "listUsers", "responses": { "200": { "description": "ok" } } },
                    "post": { "operationId": "createUser", "responses": { "201": { "description": "created" } } }
                }
            }
        }));

        let ops: Vec<_> = doc.operations().collect();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].1, Method::GET);
        assert_eq!(ops[1].2.operation_id.as_deref(), Some("createUser"));
    }

    #[test]
    fn test_base_path() {
        let mut doc = document(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "servers": [{ "url": "https://api.example.com/v1/" }]
        }));
        assert_eq!(doc.base_path(), "/v1");

        doc.servers[0].url = "/api".to_string();
        assert_eq!(doc.base_path(), "/api");

        doc.servers[0].url = "http://localhost:8080".to_string();
        assert_eq!(doc.base_path(), "");

        doc.servers.clear();
        assert_eq!(doc.base_path(), "");
    }

    #[test]
    fn test_resolve_parameter_reference() {
        let doc = document(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "components": {
                "parameters": {
                    "Limit": { "name": "limit", "in": "query", "schema": { "type": "integer" } }
                }
            }
        }));

        let reference = ReferenceOr::Reference {
            reference: "#/components/parameters/Limit".to_string(),
        };
        let parameter = doc.resolve_parameter(&reference).unwrap();
        assert_eq!(parameter.name, "limit");
        assert_eq!(parameter.location, ParameterIn::Query);

        let missing = ReferenceOr::Reference {
            reference: "#/components/parameters/Offset".to_string(),
        };
        assert!(matches!(
            doc.resolve_parameter(&missing),
            Err(OpenApiError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_schema_components() {
        let doc = document(json!({
            "openapi": "3.1.0",
            "info": { "title": "t", "version": "1" },
            "components": { "schemas": { "User": { "type": "object" } } }
        }));
        assert_eq!(
            doc.schema_components(),
            json!({ "schemas": { "User": { "type": "object" } } })
        );
    }
}

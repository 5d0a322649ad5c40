//! The compiled API contract.
//!
//! [`ApiContract`] is built once from an [`OpenApiDocument`]: references are
//! resolved, schemas compiled and routes registered. At request time it
//! resolves routes and validates requests and responses.

use std::collections::HashMap;

use http::{HeaderMap, Method};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::document::{MediaType, OpenApiDocument, ParameterIn};
use crate::error::{HttpError, OpenApiResult, ValidationIssue};
use crate::resolver::{RouteMatch, RouteResolver};
use crate::schema::{coerce_parameter, coerce_query, CompiledSchema};

/// A compiled parameter.
#[derive(Debug)]
pub struct ContractParameter {
    /// Parameter name.
    pub name: String,
    /// Location.
    pub location: ParameterIn,
    /// Whether the parameter must be present.
    pub required: bool,
    schema: Option<CompiledSchema>,
}

/// Media types and their compiled schemas.
#[derive(Debug, Default)]
pub struct ContractContent {
    media_types: IndexMap<String, Option<CompiledSchema>>,
}

impl ContractContent {
    fn compile(
        content: &IndexMap<String, MediaType>,
        components: &Value,
        location: &str,
    ) -> OpenApiResult<Self> {
        let mut media_types = IndexMap::new();
        for (media_type, entry) in content {
            let schema = entry
                .schema
                .as_ref()
                .map(|schema| {
                    CompiledSchema::compile(schema, components, &format!("{location} {media_type}"))
                })
                .transpose()?;
            media_types.insert(media_type.to_ascii_lowercase(), schema);
        }
        Ok(Self { media_types })
    }

    /// Returns `true` if no media type is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.media_types.is_empty()
    }

    /// Returns the declared media types.
    pub fn media_types(&self) -> impl Iterator<Item = &str> {
        self.media_types.keys().map(String::as_str)
    }

    /// Finds the entry for `content_type`, honoring `type/*` and `*/*`.
    fn find(&self, content_type: &str) -> Option<&Option<CompiledSchema>> {
        let essence = media_type_essence(content_type);
        if let Some(entry) = self.media_types.get(&essence) {
            return Some(entry);
        }
        let wildcard = essence
            .split_once('/')
            .map(|(kind, _)| format!("{kind}/*"))
            .unwrap_or_default();
        self.media_types
            .get(&wildcard)
            .or_else(|| self.media_types.get("*/*"))
    }

    /// Finds the first declared JSON-like media type.
    fn first_json(&self) -> Option<&Option<CompiledSchema>> {
        self.media_types
            .iter()
            .find(|(media_type, _)| is_json_media_type(media_type))
            .map(|(_, schema)| schema)
    }
}

/// A compiled request body.
#[derive(Debug)]
pub struct ContractBody {
    /// Whether a body must be sent.
    pub required: bool,
    /// Accepted media types.
    pub content: ContractContent,
}

/// A compiled operation.
#[derive(Debug)]
pub struct ContractOperation {
    /// Operation ID.
    pub operation_id: String,
    /// HTTP method.
    pub method: Method,
    /// Path template.
    pub path_template: String,
    /// Parameters, path-level ones merged in.
    pub parameters: Vec<ContractParameter>,
    /// Request body, if declared.
    pub request_body: Option<ContractBody>,
    /// Responses keyed by status, range (`2XX`) or `default`.
    pub responses: IndexMap<String, ContractContent>,
}

/// The parts of a request the validator looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    /// Values of templated path segments.
    pub path_params: &'a HashMap<String, String>,
    /// Raw query string, without the leading `?`.
    pub query: Option<&'a str>,
    /// Request headers.
    pub headers: &'a HeaderMap,
    /// Parsed body, if the body was parsed.
    pub body: Option<&'a Value>,
    /// Whether the request carried any body bytes.
    pub has_body: bool,
}

impl ContractOperation {
    /// Validates a request against this operation.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] listing every parameter and body issue found,
    /// or an unsupported media type error.
    pub fn validate_request(&self, request: &RequestParts<'_>) -> Result<(), HttpError> {
        let query = parse_query(request.query.unwrap_or(""));
        let mut issues = Vec::new();

        for parameter in &self.parameters {
            let prefix = format!("request/{}", parameter.location.as_str());
            let schema = parameter.schema.as_ref();
            let value = match parameter.location {
                ParameterIn::Path => request
                    .path_params
                    .get(&parameter.name)
                    .map(|raw| coerce_parameter(raw, schema.map(CompiledSchema::schema))),
                ParameterIn::Query => query
                    .get(&parameter.name)
                    .map(|values| coerce_query(values, schema.map(CompiledSchema::schema))),
                ParameterIn::Header => request
                    .headers
                    .get(parameter.name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .map(|raw| coerce_parameter(raw, schema.map(CompiledSchema::schema))),
                ParameterIn::Cookie => cookie_value(request.headers, &parameter.name)
                    .map(|raw| coerce_parameter(&raw, schema.map(CompiledSchema::schema))),
            };

            match (value, schema) {
                (None, _) if parameter.required => issues.push(ValidationIssue::new(
                    prefix,
                    format!("must have required property '{}'", parameter.name),
                )),
                (Some(value), Some(schema)) => {
                    let path = format!("{prefix}/{}", parameter.name);
                    issues.extend(schema.validate(&value, &path));
                }
                _ => {}
            }
        }

        if let Some(body) = &self.request_body {
            Self::validate_body(body, request, &mut issues)?;
        }

        if issues.is_empty() {
            Ok(())
        } else {
            debug!(operation_id = %self.operation_id, issues = issues.len(), "request rejected");
            Err(HttpError::bad_request(issues))
        }
    }

    fn validate_body(
        body: &ContractBody,
        request: &RequestParts<'_>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Result<(), HttpError> {
        if !request.has_body {
            if body.required {
                issues.push(ValidationIssue::new("request/body", "is required"));
            }
            return Ok(());
        }

        let content_type = request
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let Some(schema) = body.content.find(content_type) else {
            return Err(HttpError::unsupported_media_type(content_type));
        };

        match (schema, request.body) {
            (Some(schema), Some(value)) => issues.extend(schema.validate(value, "request/body")),
            // A JSON type the body parser is not configured for arrives
            // unparsed and is checked as an empty object.
            (Some(schema), None) if is_json_media_type(content_type) => {
                let unparsed = Value::Object(serde_json::Map::new());
                issues.extend(schema.validate(&unparsed, "request/body"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Validates a handler response against this operation.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::invalid_response`] when the status is not
    /// declared or the body does not match its schema.
    pub fn validate_response(
        &self,
        status: u16,
        content_type: Option<&str>,
        body: Option<&Value>,
    ) -> Result<(), HttpError> {
        let exact = status.to_string();
        let range = format!("{}XX", status / 100);
        let declared = self
            .responses
            .get(&exact)
            .or_else(|| self.responses.get(&range))
            .or_else(|| self.responses.get(&range.to_lowercase()))
            .or_else(|| self.responses.get("default"));

        let Some(content) = declared else {
            return Err(HttpError::invalid_response(vec![ValidationIssue::new(
                "",
                format!("no schema defined for status code '{status}' in the openapi spec"),
            )]));
        };

        let Some(body) = body else {
            return Ok(());
        };

        let schema = match content_type {
            Some(content_type) => content.find(content_type),
            None => content.first_json(),
        };

        if let Some(Some(schema)) = schema {
            let issues = schema.validate(body, "response/body");
            if !issues.is_empty() {
                return Err(HttpError::invalid_response(issues));
            }
        }
        Ok(())
    }
}

/// A compiled API document.
#[derive(Debug)]
pub struct ApiContract {
    title: String,
    version: String,
    resolver: RouteResolver,
    operations: IndexMap<String, ContractOperation>,
}

impl ApiContract {
    /// Compiles a document.
    ///
    /// Operations without an `operationId` are skipped; run
    /// [`crate::validate_document`] first to reject them.
    pub fn compile(document: &OpenApiDocument) -> OpenApiResult<Self> {
        let components = document.schema_components();
        let mut resolver = RouteResolver::new(document.base_path());
        let mut operations = IndexMap::new();

        for (path, item) in &document.paths {
            for (method, operation) in item.operations() {
                let Some(operation_id) = operation.operation_id.clone() else {
                    continue;
                };

                let mut parameters: Vec<ContractParameter> = Vec::new();
                for entry in item.parameters.iter().chain(&operation.parameters) {
                    let parameter = document.resolve_parameter(entry)?;
                    let schema = parameter
                        .schema
                        .as_ref()
                        .map(|schema| {
                            CompiledSchema::compile(
                                schema,
                                &components,
                                &format!("{operation_id} parameter '{}'", parameter.name),
                            )
                        })
                        .transpose()?;

                    // Operation-level parameters replace path-level ones.
                    parameters.retain(|p| {
                        !(p.name == parameter.name && p.location == parameter.location)
                    });
                    parameters.push(ContractParameter {
                        name: parameter.name.clone(),
                        location: parameter.location,
                        required: parameter.required || parameter.location == ParameterIn::Path,
                        schema,
                    });
                }

                let request_body = operation
                    .request_body
                    .as_ref()
                    .map(|entry| -> OpenApiResult<ContractBody> {
                        let body = document.resolve_request_body(entry)?;
                        Ok(ContractBody {
                            required: body.required,
                            content: ContractContent::compile(
                                &body.content,
                                &components,
                                &format!("{operation_id} request body"),
                            )?,
                        })
                    })
                    .transpose()?;

                let mut responses = IndexMap::new();
                for (status, entry) in &operation.responses {
                    let response = document.resolve_response(entry)?;
                    responses.insert(
                        status.clone(),
                        ContractContent::compile(
                            &response.content,
                            &components,
                            &format!("{operation_id} response {status}"),
                        )?,
                    );
                }

                resolver.add_route(method.clone(), path, &operation_id)?;
                operations.insert(
                    operation_id.clone(),
                    ContractOperation {
                        operation_id,
                        method,
                        path_template: path.clone(),
                        parameters,
                        request_body,
                        responses,
                    },
                );
            }
        }

        info!(
            title = %document.info.title,
            version = %document.info.version,
            operations = operations.len(),
            "API contract compiled"
        );

        Ok(Self {
            title: document.info.title.clone(),
            version: document.info.version.clone(),
            resolver,
            operations,
        })
    }

    /// Returns the document title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the document version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolves a request to a route.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, HttpError> {
        self.resolver.resolve(method, path)
    }

    /// Looks up an operation by ID.
    #[must_use]
    pub fn operation(&self, operation_id: &str) -> Option<&ContractOperation> {
        self.operations.get(operation_id)
    }

    /// Iterates operation IDs in document order.
    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if the contract has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Returns the lowercase `type/subtype` part of a content type.
#[must_use]
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Returns `true` for `application/json` and `+json` structured types.
#[must_use]
pub fn is_json_media_type(content_type: &str) -> bool {
    let essence = media_type_essence(content_type);
    essence == "application/json" || essence.ends_with("+json")
}

/// Splits a query string into values per key, repeated keys in order.
///
/// A query that is not valid `application/x-www-form-urlencoded` is treated
/// as empty.
fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_else(|e| {
        debug!(error = %e, "query string not decodable");
        Vec::new()
    });

    let mut values: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in pairs {
        values.entry(key).or_default().push(value);
    }
    values
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

//! Compiled JSON schemas.
//!
//! Validation itself is delegated to the `jsonschema` crate. This module
//! compiles document schemas once at startup and turns validator output into
//! [`ValidationIssue`]s with stable, location-prefixed messages.

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::Value;

use crate::error::{OpenApiError, OpenApiResult, ValidationIssue};

/// A schema compiled for repeated validation.
pub struct CompiledSchema {
    schema: Value,
    validator: Validator,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    /// Compiles `schema`. `components` is attached under `components` so that
    /// `#/components/schemas/...` references resolve.
    pub fn compile(schema: &Value, components: &Value, location: &str) -> OpenApiResult<Self> {
        let mut root = schema.clone();
        if let Value::Object(map) = &mut root {
            map.entry("components").or_insert_with(|| components.clone());
        }

        let validator =
            jsonschema::validator_for(&root).map_err(|e| OpenApiError::InvalidSchema {
                location: location.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            schema: schema.clone(),
            validator,
        })
    }

    /// Returns the schema as written in the document.
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns the declared `type`, if it is a single type name.
    #[must_use]
    pub fn type_hint(&self) -> Option<&str> {
        self.schema.get("type").and_then(Value::as_str)
    }

    /// Validates `instance`, prefixing every issue path with `prefix`.
    pub fn validate(&self, instance: &Value, prefix: &str) -> Vec<ValidationIssue> {
        self.validator
            .iter_errors(instance)
            .map(|error| {
                let pointer = error.instance_path.to_string();
                let path = format!("{prefix}{pointer}");
                let message = match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let name = property
                            .as_str()
                            .map_or_else(|| property.to_string(), ToString::to_string);
                        format!("must have required property '{name}'")
                    }
                    _ => error.to_string(),
                };
                ValidationIssue::new(path, message)
            })
            .collect()
    }
}

/// Converts a raw parameter string to the JSON type its schema declares.
///
/// Values that do not parse are kept as strings so the schema check reports
/// the type mismatch.
#[must_use]
pub fn coerce_parameter(raw: &str, schema: Option<&Value>) -> Value {
    let kind = schema.and_then(|s| s.get("type")).and_then(Value::as_str);
    match kind {
        Some("integer") => raw
            .parse::<i64>()
            .map_or_else(|_| Value::String(raw.to_string()), Value::from),
        Some("number") => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(raw.to_string()), Value::Number),
        Some("boolean") => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        Some("array") => {
            let items = schema.and_then(|s| s.get("items"));
            Value::Array(
                raw.split(',')
                    .map(|item| coerce_parameter(item, items))
                    .collect(),
            )
        }
        _ => Value::String(raw.to_string()),
    }
}

/// Converts the decoded values of one query key to the JSON type its schema
/// declares.
///
/// An array takes one item per occurrence of the key, so a comma inside a
/// value never splits it. A repeated key for a scalar schema becomes an
/// array of strings and fails the type check.
#[must_use]
pub fn coerce_query(values: &[String], schema: Option<&Value>) -> Value {
    let kind = schema.and_then(|s| s.get("type")).and_then(Value::as_str);
    match (kind, values) {
        (Some("array"), _) => {
            let items = schema.and_then(|s| s.get("items"));
            Value::Array(
                values
                    .iter()
                    .map(|value| coerce_scalar(value, items))
                    .collect(),
            )
        }
        (_, [single]) => coerce_parameter(single, schema),
        _ => Value::Array(values.iter().cloned().map(Value::String).collect()),
    }
}

fn coerce_scalar(raw: &str, schema: Option<&Value>) -> Value {
    match schema.and_then(|s| s.get("type")).and_then(Value::as_str) {
        Some("array" | "object") => Value::String(raw.to_string()),
        _ => coerce_parameter(raw, schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> CompiledSchema {
        let components = json!({
            "schemas": {
                "User": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string" },
                        "age": { "type": "integer", "minimum": 0 }
                    }
                }
            }
        });
        CompiledSchema::compile(
            &json!({ "$ref": "#/components/schemas/User" }),
            &components,
            "createUser request body",
        )
        .unwrap()
    }

    #[test]
    fn test_valid_instance() {
        let issues = user_schema().validate(&json!({ "name": "Ada", "age": 36 }), "request/body");
        assert!(issues.is_empty());
    }

    #[test]
    fn test_missing_required_property() {
        let issues = user_schema().validate(&json!({ "age": 36 }), "request/body");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "request/body");
        assert_eq!(issues[0].message, "must have required property 'name'");
    }

    #[test]
    fn test_nested_path_is_reported() {
        let issues = user_schema().validate(&json!({ "name": "Ada", "age": -1 }), "request/body");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "request/body/age");
    }

    #[test]
    fn test_invalid_schema() {
        let result = CompiledSchema::compile(&json!({ "type": 12 }), &json!({}), "bad");
        assert!(matches!(result, Err(OpenApiError::InvalidSchema { .. })));
    }

    #[test]
    fn test_type_hint() {
        let schema =
            CompiledSchema::compile(&json!({ "type": "integer" }), &json!({}), "limit").unwrap();
        assert_eq!(schema.type_hint(), Some("integer"));
    }

    #[test]
    fn test_coerce_parameter() {
        assert_eq!(coerce_parameter("42", Some(&json!({ "type": "integer" }))), json!(42));
        assert_eq!(coerce_parameter("4.5", Some(&json!({ "type": "number" }))), json!(4.5));
        assert_eq!(coerce_parameter("true", Some(&json!({ "type": "boolean" }))), json!(true));
        assert_eq!(
            coerce_parameter("1,2", Some(&json!({ "type": "array", "items": { "type": "integer" } }))),
            json!([1, 2])
        );
        assert_eq!(coerce_parameter("abc", Some(&json!({ "type": "integer" }))), json!("abc"));
        assert_eq!(coerce_parameter("abc", None), json!("abc"));
    }

    #[test]
    fn test_coerce_query() {
        let tags = json!({ "type": "array", "items": { "type": "integer" } });
        let values = |v: &[&str]| v.iter().map(ToString::to_string).collect::<Vec<_>>();

        assert_eq!(coerce_query(&values(&["1", "2"]), Some(&tags)), json!([1, 2]));
        assert_eq!(
            coerce_query(&values(&["a,b"]), Some(&json!({ "type": "array" }))),
            json!(["a,b"])
        );
        assert_eq!(coerce_query(&values(&["7"]), Some(&json!({ "type": "integer" }))), json!(7));
        assert_eq!(
            coerce_query(&values(&["1", "2"]), Some(&json!({ "type": "integer" }))),
            json!(["1", "2"])
        );
    }
}

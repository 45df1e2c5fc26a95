//! Declarative configuration schemas for action handlers.
//!
//! A schema lists the fields a handler understands. Fields flagged
//! `deferred` are handed to the handler unresolved; every other field is
//! resolved first and then checked here.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A single schema failure, addressed by field name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("field '{field}': {reason}")]
pub struct SchemaViolation {
    pub field: String,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Primitive shape expected for a field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// Constraints for one configuration field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Passed through to the handler without template resolution.
    #[serde(default)]
    pub deferred: bool,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl FieldSpec {
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            ..Self::default()
        }
    }

    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            ..Self::default()
        }
    }

    pub fn deferred(field_type: FieldType) -> Self {
        Self {
            field_type,
            deferred: true,
            ..Self::default()
        }
    }

    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.allowed_values = values.into_iter().collect();
        self
    }

    /// Mark a field built with another constructor as required.
    pub fn require(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// Ordered set of field constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigSchema {
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn is_deferred(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|spec| spec.deferred)
    }

    /// Structural checks performed once, when a handler is registered.
    ///
    /// Field names must be non-empty and every pattern must compile.
    pub fn check_consistency(&self) -> Result<(), SchemaViolation> {
        for (name, spec) in &self.fields {
            if name.trim().is_empty() {
                return Err(SchemaViolation::new(name, "field name cannot be empty"));
            }
            if let Some(pattern) = &spec.pattern {
                Regex::new(pattern).map_err(|error| SchemaViolation::new(name, format!("invalid pattern '{}': {}", pattern, error)))?;
            }
        }
        Ok(())
    }

    /// Validate a configuration map against this schema.
    ///
    /// Required fields must be present and non-null. Present values must match
    /// the declared type, enumeration, and pattern. Unknown fields are allowed.
    pub fn validate(&self, config: &Map<String, Value>) -> Result<(), SchemaViolation> {
        for (name, spec) in &self.fields {
            let candidate = config.get(name).filter(|value| !value.is_null());
            let Some(candidate) = candidate else {
                if spec.required {
                    return Err(SchemaViolation::new(name, "is required"));
                }
                continue;
            };
            if spec.deferred {
                continue;
            }
            if !spec.field_type.accepts(candidate) {
                return Err(SchemaViolation::new(
                    name,
                    format!("expected {}, found {}", spec.field_type.label(), describe(candidate)),
                ));
            }
            validate_candidate_value(candidate, spec).map_err(|reason| SchemaViolation::new(name, reason))?;
        }
        Ok(())
    }
}

fn validate_candidate_value(candidate: &Value, spec: &FieldSpec) -> Result<(), String> {
    if !spec.allowed_values.is_empty() && !spec.allowed_values.iter().any(|allowed| json_values_match(allowed, candidate)) {
        return Err("value is not in the allowed set".to_string());
    }

    if let Some(pattern) = &spec.pattern {
        let Value::String(text) = candidate else {
            return Err("value must be text to satisfy the pattern".to_string());
        };
        let regex = Regex::new(pattern).map_err(|error| format!("invalid pattern '{}': {}", pattern, error))?;
        if !regex.is_match(text) {
            return Err(format!("value must match the pattern {}", pattern));
        }
    }
    Ok(())
}

fn json_values_match(expected: &Value, candidate: &Value) -> bool {
    match (expected, candidate) {
        (Value::String(expected_text), Value::String(candidate_text)) => expected_text.eq_ignore_ascii_case(candidate_text),
        _ => expected == candidate,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn http_schema() -> ConfigSchema {
        ConfigSchema::new()
            .field("url", FieldSpec::required(FieldType::String))
            .field(
                "method",
                FieldSpec::optional(FieldType::String).one_of([json!("GET"), json!("POST")]),
            )
            .field("rules", FieldSpec::deferred(FieldType::Array))
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_required_field_is_reported() {
        let violation = http_schema().validate(&config(json!({"method": "GET"}))).expect_err("missing url");
        assert_eq!(violation.field, "url");
    }

    #[test]
    fn wrong_type_is_reported() {
        let violation = http_schema().validate(&config(json!({"url": 42}))).expect_err("wrong type");
        assert!(violation.reason.contains("expected string"));
    }

    #[test]
    fn enumeration_matches_case_insensitively() {
        assert!(http_schema().validate(&config(json!({"url": "/x", "method": "get"}))).is_ok());
        assert!(http_schema().validate(&config(json!({"url": "/x", "method": "PATCH"}))).is_err());
    }

    #[test]
    fn deferred_fields_skip_type_checks() {
        assert!(http_schema().validate(&config(json!({"url": "/x", "rules": "{{raw}}"}))).is_ok());
        assert!(http_schema().is_deferred("rules"));
    }

    #[test]
    fn invalid_pattern_fails_consistency_check() {
        let schema = ConfigSchema::new().field(
            "id",
            FieldSpec {
                pattern: Some("([a-z".into()),
                ..FieldSpec::default()
            },
        );
        assert!(schema.check_consistency().is_err());
    }
}

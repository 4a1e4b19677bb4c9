//! JSON-schema-like value constraints
//!
//! Schemas are stored alongside each configuration row (`validation_rules`
//! column), so they serialize to a small JSON dialect:
//!
//! ```json
//! {"type": "integer", "minimum": 1, "maximum": 32000}
//! {"type": "object", "properties": {"critical": {"type": "number"}}, "required": ["critical"]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declared shape of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfigSchema {
    String {
        #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
        allowed: Vec<String>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Boolean,
    Object {
        properties: BTreeMap<String, ConfigSchema>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
}

/// Messages collected while checking a value
#[derive(Debug, Default)]
pub(crate) struct Findings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigSchema {
    pub fn integer(minimum: i64, maximum: i64) -> Self {
        ConfigSchema::Integer {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }

    pub fn number(minimum: f64, maximum: f64) -> Self {
        ConfigSchema::Number {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }

    pub fn one_of(allowed: &[&str]) -> Self {
        ConfigSchema::String {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Object whose listed properties are all required
    pub fn object(properties: &[(&str, ConfigSchema)]) -> Self {
        ConfigSchema::Object {
            properties: properties
                .iter()
                .map(|(name, schema)| (name.to_string(), schema.clone()))
                .collect(),
            required: properties.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigSchema::String { .. } => "string",
            ConfigSchema::Integer { .. } => "integer",
            ConfigSchema::Number { .. } => "number",
            ConfigSchema::Boolean => "boolean",
            ConfigSchema::Object { .. } => "object",
        }
    }

    /// Check `value`, reporting problems as `"<path>: <reason>"`
    pub(crate) fn check(&self, path: &str, value: &Value, findings: &mut Findings) {
        match self {
            ConfigSchema::String { allowed } => {
                let Some(s) = value.as_str() else {
                    findings.errors.push(type_error(path, self, value));
                    return;
                };
                if !allowed.is_empty() && !allowed.iter().any(|a| a == s) {
                    findings.errors.push(format!(
                        "{}: '{}' is not one of [{}]",
                        path,
                        s,
                        allowed.join(", ")
                    ));
                }
            }
            ConfigSchema::Integer { minimum, maximum } => {
                let Some(v) = value.as_i64() else {
                    findings.errors.push(type_error(path, self, value));
                    return;
                };
                if minimum.is_some_and(|min| v < min) || maximum.is_some_and(|max| v > max) {
                    findings
                        .errors
                        .push(range_error(path, v, minimum.map(|m| m as f64), maximum.map(|m| m as f64)));
                }
            }
            ConfigSchema::Number { minimum, maximum } => {
                let Some(v) = value.as_f64().filter(|v| v.is_finite()) else {
                    findings.errors.push(type_error(path, self, value));
                    return;
                };
                if minimum.is_some_and(|min| v < min) || maximum.is_some_and(|max| v > max) {
                    findings.errors.push(range_error(path, v, *minimum, *maximum));
                }
            }
            ConfigSchema::Boolean => {
                if !value.is_boolean() {
                    findings.errors.push(type_error(path, self, value));
                }
            }
            ConfigSchema::Object {
                properties,
                required,
            } => {
                let Some(map) = value.as_object() else {
                    findings.errors.push(type_error(path, self, value));
                    return;
                };
                for name in required {
                    if !map.contains_key(name) {
                        findings
                            .errors
                            .push(format!("{}.{}: required property is missing", path, name));
                    }
                }
                for (name, child) in map {
                    let child_path = format!("{}.{}", path, name);
                    match properties.get(name) {
                        Some(schema) => schema.check(&child_path, child, findings),
                        None => findings
                            .warnings
                            .push(format!("{}: unknown property is ignored", child_path)),
                    }
                }
            }
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, schema: &ConfigSchema, value: &Value) -> String {
    format!(
        "{}: expected {}, got {}",
        path,
        schema.type_name(),
        json_type_name(value)
    )
}

fn range_error<T: std::fmt::Display>(
    path: &str,
    value: T,
    minimum: Option<f64>,
    maximum: Option<f64>,
) -> String {
    let bound = |b: Option<f64>| b.map_or_else(|| "-".to_string(), |b| b.to_string());
    format!(
        "{}: value {} out of range [{}, {}]",
        path,
        value,
        bound(minimum),
        bound(maximum)
    )
}

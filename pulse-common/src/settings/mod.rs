//! Configuration governance
//!
//! Versioned system configuration: every value is checked against a declared
//! schema and business rules before the store accepts it, and every applied
//! change appends an immutable history entry.
//!
//! # Architecture
//!
//! - `metadata`: registry of known keys (schema, rules, default)
//! - `schema` / `rules`: the checks themselves
//! - `validator`: validation, dry-run testing and history retrieval
//! - Persistence lives in `db::configurations`; validation never writes.

mod metadata;
mod rules;
mod schema;
mod validator;

#[cfg(test)]
mod tests;

pub use metadata::{
    default_value, lookup, model_token_limit, registry, ConfigMetadata, DEFAULT_MODEL,
    SUPPORTED_MODELS,
};
pub use rules::BusinessRule;
pub use schema::ConfigSchema;
pub use validator::{
    validate_configuration, ConfigurationValidator, PROVIDER_MIN_LATENCY_SECONDS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_SCOPE: &str = "global";

/// Upper bound on history records returned by one request
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Clamp a requested history limit into `[1, MAX_HISTORY_LIMIT]`
pub fn clamp_history_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

/// Composite configuration key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    pub category: String,
    pub key: String,
    pub environment: String,
    pub scope: String,
}

impl ConfigKey {
    /// Key in the default environment and global scope
    pub fn new(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// `category.key`
    pub fn path(&self) -> String {
        format!("{}.{}", self.category, self.key)
    }
}

/// A stored configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfiguration {
    pub category: String,
    pub key: String,
    pub environment: String,
    pub scope: String,
    pub value: Value,
    pub validation_rules: ConfigSchema,
    pub business_rules: Vec<BusinessRule>,
    pub description: Option<String>,
    /// Starts at 1, incremented by exactly one per applied change
    pub version: i64,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl SystemConfiguration {
    /// Registry default for a key, version 1, not yet persisted
    pub fn from_metadata(meta: &ConfigMetadata, environment: &str, scope: &str) -> Self {
        Self {
            category: meta.category.to_string(),
            key: meta.key.to_string(),
            environment: environment.to_string(),
            scope: scope.to_string(),
            value: meta.default_value.clone(),
            validation_rules: meta.schema.clone(),
            business_rules: meta.rules.clone(),
            description: Some(meta.description.to_string()),
            version: 1,
            updated_by: None,
            updated_at: Utc::now(),
        }
    }

    pub fn config_key(&self) -> ConfigKey {
        ConfigKey {
            category: self.category.clone(),
            key: self.key.clone(),
            environment: self.environment.clone(),
            scope: self.scope.clone(),
        }
    }
}

/// Immutable history entry written for every applied change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChange {
    pub id: i64,
    pub category: String,
    pub key: String,
    pub environment: String,
    pub scope: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
    /// Version the change produced
    pub version: i64,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// A requested write, checked before anything is stored
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    pub key: ConfigKey,
    pub value: Value,
    /// Reject with `Conflict` unless the stored version matches
    pub expected_version: Option<i64>,
    pub reason: Option<String>,
}

/// Outcome of `validate_configuration`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn from_findings(findings: schema::Findings) -> Self {
        Self {
            valid: findings.errors.is_empty(),
            errors: findings.errors,
            warnings: findings.warnings,
        }
    }

    /// `Err(Error::Validation)` carrying the per-field messages when invalid
    pub fn into_result(self) -> crate::Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(crate::Error::Validation(self.errors))
        }
    }
}

/// Outcome of a dry run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigTestResult {
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigTestResult {
    pub(crate) fn new() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.passed = false;
        self.errors.push(message);
    }

    pub(crate) fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

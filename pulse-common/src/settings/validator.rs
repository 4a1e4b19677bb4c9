//! Configuration validation, dry-run testing and history retrieval

use super::metadata::{lookup, model_token_limit, DEFAULT_MODEL};
use super::schema::Findings;
use super::{
    clamp_history_limit, ConfigChange, ConfigKey, ConfigTestResult, ValidationResult,
    DEFAULT_ENVIRONMENT,
};
use crate::db::configurations;
use crate::scoring::{DifficultyWeights, PriorityThresholds, PRIORITY_FLOOR, SCORE_MAX};
use crate::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::warn;

/// Shortest timeout a provider round trip can realistically complete in
pub const PROVIDER_MIN_LATENCY_SECONDS: i64 = 10;

/// Timeouts below this pass, with a warning
const RECOMMENDED_MIN_TIMEOUT_SECONDS: i64 = 15;

/// Relative change that earns a warning when compared to the existing value
const LARGE_CHANGE_RATIO: f64 = 0.5;

/// Check `value` against the registered schema and business rules
///
/// Returns `Error::NotFound` for unknown `(category, key)` pairs. Comparing
/// with `existing` only adds warnings. Never touches storage.
pub fn validate_configuration(
    category: &str,
    key: &str,
    value: &Value,
    existing: Option<&Value>,
) -> Result<ValidationResult> {
    let meta = lookup(category, key)
        .ok_or_else(|| Error::NotFound(format!("configuration key {}.{}", category, key)))?;
    let path = meta.path();

    let mut findings = Findings::default();
    meta.schema.check(&path, value, &mut findings);
    for rule in &meta.rules {
        findings.errors.extend(rule.check(&path, value));
    }
    if let Some(existing) = existing {
        compare_with_existing(&path, value, existing, &mut findings.warnings);
    }

    Ok(ValidationResult::from_findings(findings))
}

fn compare_with_existing(path: &str, value: &Value, existing: &Value, warnings: &mut Vec<String>) {
    if value == existing {
        warnings.push(format!("{}: value is unchanged", path));
        return;
    }

    match (value, existing) {
        (Value::Object(new), Value::Object(old)) => {
            for (name, new_field) in new {
                if let Some(old_field) = old.get(name) {
                    large_change(&format!("{}.{}", path, name), new_field, old_field, warnings);
                }
            }
        }
        _ => large_change(path, value, existing, warnings),
    }
}

fn large_change(path: &str, new: &Value, old: &Value, warnings: &mut Vec<String>) {
    let (Some(new), Some(old)) = (new.as_f64(), old.as_f64()) else {
        return;
    };
    if old == 0.0 || !old.is_finite() || !new.is_finite() {
        return;
    }
    let ratio = (new - old).abs() / old.abs();
    if ratio > LARGE_CHANGE_RATIO {
        warnings.push(format!(
            "{}: changes by {:.0}% (from {} to {})",
            path,
            ratio * 100.0,
            old,
            new
        ));
    }
}

/// Validation and dry runs against one environment's stored configuration
#[derive(Clone)]
pub struct ConfigurationValidator {
    pool: SqlitePool,
    environment: String,
}

impl ConfigurationValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// See [`validate_configuration`]
    pub fn validate_configuration(
        &self,
        category: &str,
        key: &str,
        value: &Value,
        existing: Option<&Value>,
    ) -> Result<ValidationResult> {
        validate_configuration(category, key, value, existing)
    }

    /// Non-persistent dry run: would `value` work with the rest of the
    /// current configuration?
    ///
    /// Only runs once validation passes; otherwise the result fails with the
    /// validation errors.
    pub async fn test_configuration(
        &self,
        category: &str,
        key: &str,
        value: &Value,
    ) -> Result<ConfigTestResult> {
        let validation = validate_configuration(category, key, value, None)?;
        let mut result = ConfigTestResult::new();
        if !validation.valid {
            for error in validation.errors {
                result.fail(format!("validation: {}", error));
            }
            return Ok(result);
        }

        let path = format!("{}.{}", category, key);
        match (category, key) {
            ("ai", "operation_timeout_seconds") => {
                let seconds = value.as_i64().unwrap_or_default();
                if seconds < PROVIDER_MIN_LATENCY_SECONDS {
                    result.fail(format!(
                        "{}: {}s is below the provider latency budget of {}s",
                        path, seconds, PROVIDER_MIN_LATENCY_SECONDS
                    ));
                } else if seconds < RECOMMENDED_MIN_TIMEOUT_SECONDS {
                    result.warn(format!(
                        "{}: {}s leaves little headroom for slow provider responses",
                        path, seconds
                    ));
                }
            }
            ("ai", "max_tokens") => {
                let tokens = value.as_i64().unwrap_or_default();
                let current_model = self.current_value("ai", "model").await;
                let model = current_model.as_str().unwrap_or(DEFAULT_MODEL);
                check_token_limit(&mut result, &path, model, tokens);
            }
            ("ai", "model") => {
                let model = value.as_str().unwrap_or(DEFAULT_MODEL);
                let tokens = self
                    .current_value("ai", "max_tokens")
                    .await
                    .as_i64()
                    .unwrap_or_default();
                check_token_limit(&mut result, &path, model, tokens);
            }
            ("ai", "worker_count") => {
                let workers = value.as_i64().unwrap_or_default();
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get() as i64)
                    .unwrap_or(1);
                if workers > cores {
                    result.warn(format!(
                        "{}: {} workers exceeds {} available cores",
                        path, workers, cores
                    ));
                }
            }
            ("ai", "requests_per_minute") => {
                let rpm = value.as_i64().unwrap_or_default();
                let workers = self
                    .current_value("ai", "worker_count")
                    .await
                    .as_i64()
                    .unwrap_or(1);
                if rpm < workers {
                    result.warn(format!(
                        "{}: {} requests/minute will keep {} workers waiting on the rate limiter",
                        path, rpm, workers
                    ));
                }
            }
            ("scoring", "priority_thresholds") => {
                match serde_json::from_value::<PriorityThresholds>(value.clone()) {
                    Ok(thresholds) => check_thresholds_reachable(&mut result, &path, &thresholds),
                    Err(e) => result.fail(format!("{}: {}", path, e)),
                }
            }
            ("scoring", "difficulty_weights") => {
                match serde_json::from_value::<DifficultyWeights>(value.clone()) {
                    Ok(weights) => {
                        for (signal, weight) in [
                            ("length", weights.length),
                            ("keywords", weights.keywords),
                            ("context", weights.context),
                        ] {
                            if weight == 0.0 {
                                result.warn(format!(
                                    "{}.{}: weight 0 disables this signal",
                                    path, signal
                                ));
                            }
                        }
                    }
                    Err(e) => result.fail(format!("{}: {}", path, e)),
                }
            }
            _ => {}
        }

        Ok(result)
    }

    /// Most recent changes, newest first, at most `MAX_HISTORY_LIMIT`
    pub async fn get_configuration_history(
        &self,
        category: Option<&str>,
        key: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ConfigChange>> {
        configurations::get_configuration_history(
            &self.pool,
            category,
            key,
            clamp_history_limit(limit),
        )
        .await
    }

    /// Stored value in this environment, registry default if absent or unreadable
    async fn current_value(&self, category: &str, key: &str) -> Value {
        let config_key = ConfigKey::new(category, key).with_environment(&self.environment);
        match configurations::find_configuration(&self.pool, &config_key).await {
            Ok(Some(config)) => config.value,
            Ok(None) => super::default_value(category, key),
            Err(e) => {
                warn!(
                    key = %config_key.path(),
                    error = %e,
                    "Configuration read failed, using registry default"
                );
                super::default_value(category, key)
            }
        }
    }
}

fn check_token_limit(result: &mut ConfigTestResult, path: &str, model: &str, tokens: i64) {
    match model_token_limit(model) {
        Some(limit) if tokens > limit => result.fail(format!(
            "{}: max_tokens {} exceeds the {} completion limit of {}",
            path, tokens, model, limit
        )),
        Some(_) => {}
        None => result.warn(format!("{}: no known token limit for model {}", path, model)),
    }
}

fn check_thresholds_reachable(
    result: &mut ConfigTestResult,
    path: &str,
    thresholds: &PriorityThresholds,
) {
    for (band, threshold) in [
        ("critical", thresholds.critical),
        ("high", thresholds.high),
        ("medium", thresholds.medium),
        ("low", thresholds.low),
    ] {
        if threshold > SCORE_MAX || threshold <= PRIORITY_FLOOR {
            result.fail(format!(
                "{}.{}: {} is outside the priority score range ({}, {}]",
                path, band, threshold, PRIORITY_FLOOR, SCORE_MAX
            ));
        }
    }

    // priority = roi - difficulty/2, so reaching `critical` needs
    // difficulty <= 2 * (100 - critical) even at maximal ROI
    let max_difficulty = 2.0 * (SCORE_MAX - thresholds.critical);
    if max_difficulty < 20.0 {
        result.warn(format!(
            "{}.critical: only initiatives with difficulty at most {} can reach {}",
            path, max_difficulty, thresholds.critical
        ));
    }
}

//! Configuration store
//!
//! Read/write operations over `system_configurations` and the append-only
//! `configuration_history`. Writes go through `apply_configuration_change`,
//! which validates first and only then touches storage.

use super::{parse_json, parse_timestamp, parse_uuid, retry_on_lock, to_json};
use crate::auth::{AuthenticatedUser, Role};
use crate::settings::{
    clamp_history_limit, registry, validate_configuration, ChangeRequest, ConfigChange, ConfigKey,
    SystemConfiguration,
};
use crate::{Error, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Lock-contention budget for configuration writes
const WRITE_MAX_WAIT_MS: u64 = 5000;

/// Result of an applied change
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub configuration: SystemConfiguration,
    pub change: ConfigChange,
    /// Validation warnings (unchanged value, large numeric jump)
    pub warnings: Vec<String>,
}

pub async fn find_configuration(
    pool: &SqlitePool,
    key: &ConfigKey,
) -> Result<Option<SystemConfiguration>> {
    let row = sqlx::query(
        r#"
        SELECT category, key, environment, scope, value, validation_rules, business_rules,
               description, version, updated_by, updated_at
        FROM system_configurations
        WHERE category = ? AND key = ? AND environment = ? AND scope = ?
        "#,
    )
    .bind(&key.category)
    .bind(&key.key)
    .bind(&key.environment)
    .bind(&key.scope)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(configuration_from_row).transpose()
}

/// Insert a new configuration row
///
/// The value must pass validation. An existing row with the same composite
/// key is a `Conflict`.
pub async fn create_configuration(pool: &SqlitePool, config: &SystemConfiguration) -> Result<()> {
    validate_configuration(&config.category, &config.key, &config.value, None)?.into_result()?;
    insert_configuration(pool, config).await
}

async fn insert_configuration(pool: &SqlitePool, config: &SystemConfiguration) -> Result<()> {
    let value = to_json("value", &config.value)?;
    let validation_rules = to_json("validation_rules", &config.validation_rules)?;
    let business_rules = to_json("business_rules", &config.business_rules)?;
    let updated_by = config.updated_by.map(|u| u.to_string());
    let updated_at = config.updated_at.to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO system_configurations (
            category, key, environment, scope, value, validation_rules, business_rules,
            description, version, updated_by, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&config.category)
    .bind(&config.key)
    .bind(&config.environment)
    .bind(&config.scope)
    .bind(&value)
    .bind(&validation_rules)
    .bind(&business_rules)
    .bind(&config.description)
    .bind(config.version)
    .bind(&updated_by)
    .bind(&updated_at)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => Error::Conflict(
            format!("configuration {} already exists", config.config_key().path()),
        ),
        other => Error::Database(other),
    })?;

    Ok(())
}

/// Configurations in one environment, optionally limited to a category
pub async fn list_configurations(
    pool: &SqlitePool,
    category: Option<&str>,
    environment: &str,
) -> Result<Vec<SystemConfiguration>> {
    let rows = sqlx::query(
        r#"
        SELECT category, key, environment, scope, value, validation_rules, business_rules,
               description, version, updated_by, updated_at
        FROM system_configurations
        WHERE environment = ? AND (? IS NULL OR category = ?)
        ORDER BY category, key, scope
        "#,
    )
    .bind(environment)
    .bind(category)
    .bind(category)
    .fetch_all(pool)
    .await?;

    rows.iter().map(configuration_from_row).collect()
}

/// Insert registry defaults for every key missing in `environment`
///
/// Returns the number of rows inserted. Existing values are never touched.
pub async fn seed_defaults(pool: &SqlitePool, environment: &str) -> Result<usize> {
    let mut inserted = 0;
    for meta in registry() {
        let config =
            SystemConfiguration::from_metadata(meta, environment, crate::settings::DEFAULT_SCOPE);
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO system_configurations (
                category, key, environment, scope, value, validation_rules, business_rules,
                description, version, updated_by, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, NULL, ?)
            "#,
        )
        .bind(&config.category)
        .bind(&config.key)
        .bind(&config.environment)
        .bind(&config.scope)
        .bind(to_json("value", &config.value)?)
        .bind(to_json("validation_rules", &config.validation_rules)?)
        .bind(to_json("business_rules", &config.business_rules)?)
        .bind(&config.description)
        .bind(config.updated_at.to_rfc3339())
        .execute(pool)
        .await?;
        inserted += result.rows_affected() as usize;
    }

    if inserted > 0 {
        info!(environment, inserted, "Seeded default configuration");
    }
    Ok(inserted)
}

/// Validate and apply one change
///
/// Order of checks:
/// 1. `editor` must be an admin (`Forbidden`)
/// 2. value must validate (`Validation`); nothing is written otherwise
/// 3. `expected_version`, when given, must match the stored version (`Conflict`)
///
/// The update and its history entry are written in one transaction; the
/// version increments by exactly one. A key registered but not yet stored is
/// created at version 1.
pub async fn apply_configuration_change(
    pool: &SqlitePool,
    request: &ChangeRequest,
    editor: &AuthenticatedUser,
) -> Result<AppliedChange> {
    editor.require(Role::Admin)?;

    let key = &request.key;
    let existing = find_configuration(pool, key).await?;
    let validation = validate_configuration(
        &key.category,
        &key.key,
        &request.value,
        existing.as_ref().map(|c| &c.value),
    )?
    .into_result()?;

    let current_version = existing.as_ref().map_or(0, |c| c.version);
    if let Some(expected) = request.expected_version {
        if expected != current_version {
            return Err(Error::Conflict(format!(
                "{} is at version {}, expected {}",
                key.path(),
                current_version,
                expected
            )));
        }
    }

    let (configuration, change) = retry_on_lock("apply_configuration_change", WRITE_MAX_WAIT_MS, || {
        write_change(pool, request, editor, existing.as_ref())
    })
    .await?;

    info!(
        key = %key.path(),
        environment = %key.environment,
        scope = %key.scope,
        version = configuration.version,
        changed_by = %editor.user_id,
        "Configuration changed"
    );

    Ok(AppliedChange {
        configuration,
        change,
        warnings: validation.warnings,
    })
}

async fn write_change(
    pool: &SqlitePool,
    request: &ChangeRequest,
    editor: &AuthenticatedUser,
    existing: Option<&SystemConfiguration>,
) -> Result<(SystemConfiguration, ConfigChange)> {
    let key = &request.key;
    let now = Utc::now();
    let new_value = to_json("value", &request.value)?;
    let old_value = existing.map(|c| to_json("old_value", &c.value)).transpose()?;

    let mut tx = pool.begin().await?;

    let configuration = match existing {
        Some(current) => {
            // Optimistic check: a concurrent writer bumps the version first
            let updated = sqlx::query(
                r#"
                UPDATE system_configurations
                SET value = ?, version = version + 1, updated_by = ?, updated_at = ?
                WHERE category = ? AND key = ? AND environment = ? AND scope = ? AND version = ?
                "#,
            )
            .bind(&new_value)
            .bind(editor.user_id.to_string())
            .bind(now.to_rfc3339())
            .bind(&key.category)
            .bind(&key.key)
            .bind(&key.environment)
            .bind(&key.scope)
            .bind(current.version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(Error::Conflict(format!(
                    "{} was modified concurrently",
                    key.path()
                )));
            }

            SystemConfiguration {
                value: request.value.clone(),
                version: current.version + 1,
                updated_by: Some(editor.user_id),
                updated_at: now,
                ..current.clone()
            }
        }
        None => {
            let meta = crate::settings::lookup(&key.category, &key.key)
                .ok_or_else(|| Error::NotFound(format!("configuration key {}", key.path())))?;
            let mut config = SystemConfiguration::from_metadata(meta, &key.environment, &key.scope);
            config.value = request.value.clone();
            config.updated_by = Some(editor.user_id);
            config.updated_at = now;

            sqlx::query(
                r#"
                INSERT INTO system_configurations (
                    category, key, environment, scope, value, validation_rules, business_rules,
                    description, version, updated_by, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(&key.category)
            .bind(&key.key)
            .bind(&key.environment)
            .bind(&key.scope)
            .bind(&new_value)
            .bind(to_json("validation_rules", &config.validation_rules)?)
            .bind(to_json("business_rules", &config.business_rules)?)
            .bind(&config.description)
            .bind(editor.user_id.to_string())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    Error::Conflict(format!("{} was created concurrently", key.path()))
                }
                other => Error::Database(other),
            })?;

            config
        }
    };

    let history_id = sqlx::query(
        r#"
        INSERT INTO configuration_history (
            category, key, environment, scope, old_value, new_value, version,
            changed_by, changed_at, reason
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&key.category)
    .bind(&key.key)
    .bind(&key.environment)
    .bind(&key.scope)
    .bind(&old_value)
    .bind(&new_value)
    .bind(configuration.version)
    .bind(editor.user_id.to_string())
    .bind(now.to_rfc3339())
    .bind(&request.reason)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;

    let change = ConfigChange {
        id: history_id,
        category: key.category.clone(),
        key: key.key.clone(),
        environment: key.environment.clone(),
        scope: key.scope.clone(),
        old_value: existing.map(|c| c.value.clone()),
        new_value: request.value.clone(),
        version: configuration.version,
        changed_by: editor.user_id,
        changed_at: now,
        reason: request.reason.clone(),
    };

    Ok((configuration, change))
}

/// History entries, newest first
///
/// `limit` is clamped to `[1, MAX_HISTORY_LIMIT]`.
pub async fn get_configuration_history(
    pool: &SqlitePool,
    category: Option<&str>,
    key: Option<&str>,
    limit: i64,
) -> Result<Vec<ConfigChange>> {
    let rows = sqlx::query(
        r#"
        SELECT id, category, key, environment, scope, old_value, new_value, version,
               changed_by, changed_at, reason
        FROM configuration_history
        WHERE (? IS NULL OR category = ?) AND (? IS NULL OR key = ?)
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(category)
    .bind(category)
    .bind(key)
    .bind(key)
    .bind(clamp_history_limit(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(change_from_row).collect()
}

fn configuration_from_row(row: &SqliteRow) -> Result<SystemConfiguration> {
    let updated_by: Option<String> = row.get("updated_by");
    let updated_at: String = row.get("updated_at");

    Ok(SystemConfiguration {
        category: row.get("category"),
        key: row.get("key"),
        environment: row.get("environment"),
        scope: row.get("scope"),
        value: parse_json("value", row.get::<&str, _>("value"))?,
        validation_rules: parse_json("validation_rules", row.get::<&str, _>("validation_rules"))?,
        business_rules: parse_json("business_rules", row.get::<&str, _>("business_rules"))?,
        description: row.get("description"),
        version: row.get("version"),
        updated_by: updated_by
            .as_deref()
            .map(|u| parse_uuid("updated_by", u))
            .transpose()?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn change_from_row(row: &SqliteRow) -> Result<ConfigChange> {
    let old_value: Option<String> = row.get("old_value");
    let changed_by: String = row.get("changed_by");
    let changed_at: String = row.get("changed_at");

    Ok(ConfigChange {
        id: row.get("id"),
        category: row.get("category"),
        key: row.get("key"),
        environment: row.get("environment"),
        scope: row.get("scope"),
        old_value: old_value
            .as_deref()
            .map(|v| parse_json("old_value", v))
            .transpose()?,
        new_value: parse_json("new_value", row.get::<&str, _>("new_value"))?,
        version: row.get("version"),
        changed_by: parse_uuid("changed_by", &changed_by)?,
        changed_at: parse_timestamp("changed_at", &changed_at)?,
        reason: row.get("reason"),
    })
}

//! Configuration endpoints
//!
//! Validation and dry runs never touch storage. Writes go through
//! `apply_configuration_change` and announce themselves on the event bus so
//! runtime settings reload.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use pulse_common::auth::{AuthenticatedUser, Role};
use pulse_common::db::configurations::{
    apply_configuration_change, find_configuration, list_configurations,
};
use pulse_common::events::PulseEvent;
use pulse_common::settings::{
    ChangeRequest, ConfigChange, ConfigKey, ConfigTestResult, SystemConfiguration,
    ValidationResult, DEFAULT_SCOPE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Default page size for GET /api/config/history
const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Body of POST /api/config/validate and /api/config/test
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValueRequest {
    pub category: String,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// POST /api/config/test response
#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub validation: ValidationResult,
    /// Present only when validation passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<ConfigTestResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub category: Option<String>,
    pub key: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub environment: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub environment: Option<String>,
}

/// Body of PUT /api/config/{category}/{key}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub value: Value,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// PUT /api/config/{category}/{key} response
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    #[serde(flatten)]
    pub configuration: SystemConfiguration,
    pub warnings: Vec<String>,
}

fn config_key(
    state: &AppState,
    category: &str,
    key: &str,
    environment: Option<String>,
    scope: Option<String>,
) -> ConfigKey {
    ConfigKey::new(category, key)
        .with_environment(environment.unwrap_or_else(|| state.environment().to_string()))
        .with_scope(scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()))
}

/// POST /api/config/validate
///
/// Compares against the stored value when one exists, so unchanged values
/// and large jumps come back as warnings.
pub async fn validate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<ConfigValueRequest>,
) -> ApiResult<Json<ValidationResult>> {
    user.require(Role::Admin)?;
    let key = config_key(
        &state,
        &request.category,
        &request.key,
        request.environment,
        request.scope,
    );
    let existing = find_configuration(&state.db, &key).await?;
    let result = state.validator.validate_configuration(
        &key.category,
        &key.key,
        &request.value,
        existing.as_ref().map(|c| &c.value),
    )?;
    Ok(Json(result))
}

/// POST /api/config/test
pub async fn test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<ConfigValueRequest>,
) -> ApiResult<Json<TestResponse>> {
    user.require(Role::Admin)?;
    let validation =
        state
            .validator
            .validate_configuration(&request.category, &request.key, &request.value, None)?;
    let test = if validation.valid {
        Some(
            state
                .validator
                .test_configuration(&request.category, &request.key, &request.value)
                .await?,
        )
    } else {
        None
    };
    Ok(Json(TestResponse { validation, test }))
}

/// GET /api/config/history
pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<ConfigChange>>> {
    user.require(Role::Admin)?;
    let changes = state
        .validator
        .get_configuration_history(
            query.category.as_deref(),
            query.key.as_deref(),
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;
    Ok(Json(changes))
}

/// GET /api/config
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<SystemConfiguration>>> {
    user.require(Role::Viewer)?;
    let environment = query
        .environment
        .unwrap_or_else(|| state.environment().to_string());
    let configurations =
        list_configurations(&state.db, query.category.as_deref(), &environment).await?;
    Ok(Json(configurations))
}

/// GET /api/config/{category}/{key}
pub async fn get_configuration(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((category, key)): Path<(String, String)>,
    Query(query): Query<LocationQuery>,
) -> ApiResult<Json<SystemConfiguration>> {
    user.require(Role::Viewer)?;
    let config_key = config_key(&state, &category, &key, query.environment, query.scope);
    let configuration = find_configuration(&state.db, &config_key)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Configuration {} is not set in {}/{}",
                config_key.path(),
                config_key.environment,
                config_key.scope
            ))
        })?;
    Ok(Json(configuration))
}

/// PUT /api/config/{category}/{key}
pub async fn update_configuration(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((category, key)): Path<(String, String)>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<Json<UpdateResponse>> {
    let change = ChangeRequest {
        key: config_key(&state, &category, &key, request.environment, request.scope),
        value: request.value,
        expected_version: request.expected_version,
        reason: request.reason,
    };

    let applied = apply_configuration_change(&state.db, &change, &user).await?;
    let configuration = applied.configuration;

    info!(
        key = %change.key.path(),
        version = configuration.version,
        changed_by = %user.user_id,
        "Configuration updated via API"
    );

    state.event_bus.emit_lossy(PulseEvent::ConfigurationChanged {
        category: configuration.category.clone(),
        key: configuration.key.clone(),
        environment: configuration.environment.clone(),
        scope: configuration.scope.clone(),
        version: configuration.version,
        changed_by: user.user_id,
        timestamp: configuration.updated_at,
    });

    Ok(Json(UpdateResponse {
        configuration,
        warnings: applied.warnings,
    }))
}

/// Build configuration routes
pub fn configuration_routes() -> Router<AppState> {
    Router::new()
        .route("/api/config", get(list))
        .route("/api/config/validate", post(validate))
        .route("/api/config/test", post(test))
        .route("/api/config/history", get(history))
        .route(
            "/api/config/:category/:key",
            get(get_configuration).put(update_configuration),
        )
}

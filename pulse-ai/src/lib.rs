//! pulse-ai library interface
//!
//! HTTP service around the AI operation queue, the configuration store and
//! the scoring engine. Exposed as a library so integration tests can build
//! the router without binding a socket.

pub mod api;
pub mod db;
pub mod error;
pub mod prompts;
pub mod provider;
pub mod queue;
pub mod settings;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pulse_common::events::EventBus;
use pulse_common::settings::ConfigurationValidator;
use queue::OperationQueue;
use settings::SettingsHandle;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting and settings reload
    pub event_bus: EventBus,
    pub queue: Arc<OperationQueue>,
    pub validator: ConfigurationValidator,
    pub settings: SettingsHandle,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        queue: Arc<OperationQueue>,
        settings: SettingsHandle,
    ) -> Self {
        let validator =
            ConfigurationValidator::new(db.clone()).with_environment(settings.environment());
        Self {
            db,
            event_bus,
            queue,
            validator,
            settings,
            startup_time: Utc::now(),
        }
    }

    /// Deployment environment configuration reads and writes default to
    pub fn environment(&self) -> &str {
        self.settings.environment()
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` passes the auth middleware.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(api::ai_routes())
        .merge(api::configuration_routes())
        .merge(api::scoring_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::auth::require_auth,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! Runtime settings backed by the configuration store
//!
//! The current values live in a `watch` channel: readers take a cheap
//! snapshot, the reload listener replaces it after every
//! `ConfigurationChanged` event. Each queued operation keeps the AI snapshot
//! taken at enqueue, so a reload never affects work already accepted.

use pulse_common::db::configurations::list_configurations;
use pulse_common::events::{EventBus, PulseEvent};
use pulse_common::scoring::{DifficultyWeights, PriorityThresholds};
use pulse_common::settings::{default_value, SystemConfiguration};
use pulse_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Provider and queue parameters, snapshotted per operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub operation_timeout_seconds: u64,
    pub worker_count: usize,
    pub max_queue_depth: usize,
    pub completion_retention_seconds: u64,
    pub requests_per_minute: u32,
}

impl AiSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    pub fn completion_retention(&self) -> Duration {
        Duration::from_secs(self.completion_retention_seconds)
    }

    /// Overlay one stored `ai.*` value; unknown keys and wrong types are ignored
    fn apply(&mut self, key: &str, value: &Value) {
        match key {
            "model" => {
                if let Some(v) = value.as_str() {
                    self.model = v.to_string();
                }
            }
            "max_tokens" => set_from(&mut self.max_tokens, value.as_u64()),
            "temperature" => {
                if let Some(v) = value.as_f64() {
                    self.temperature = v as f32;
                }
            }
            "operation_timeout_seconds" => set_from(&mut self.operation_timeout_seconds, value.as_u64()),
            "worker_count" => set_from(&mut self.worker_count, value.as_u64()),
            "max_queue_depth" => set_from(&mut self.max_queue_depth, value.as_u64()),
            "completion_retention_seconds" => {
                set_from(&mut self.completion_retention_seconds, value.as_u64())
            }
            "requests_per_minute" => set_from(&mut self.requests_per_minute, value.as_u64()),
            other => debug!(key = other, "Ignoring unknown ai setting"),
        }
    }
}

fn set_from<T: TryFrom<u64>>(field: &mut T, value: Option<u64>) {
    if let Some(v) = value.and_then(|v| T::try_from(v).ok()) {
        *field = v;
    }
}

impl Default for AiSettings {
    /// Registry defaults
    fn default() -> Self {
        let mut settings = Self {
            model: String::new(),
            max_tokens: 0,
            temperature: 0.0,
            operation_timeout_seconds: 0,
            worker_count: 0,
            max_queue_depth: 0,
            completion_retention_seconds: 0,
            requests_per_minute: 0,
        };
        for key in [
            "model",
            "max_tokens",
            "temperature",
            "operation_timeout_seconds",
            "worker_count",
            "max_queue_depth",
            "completion_retention_seconds",
            "requests_per_minute",
        ] {
            settings.apply(key, &default_value("ai", key));
        }
        settings
    }
}

/// Scoring parameters used by the scoring endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringSettings {
    pub priority_thresholds: PriorityThresholds,
    pub difficulty_weights: DifficultyWeights,
}

/// Everything the service reads from the configuration store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub ai: AiSettings,
    pub scoring: ScoringSettings,
}

impl Settings {
    /// Build from stored rows; missing or malformed values keep their defaults
    pub fn from_configurations(configurations: &[SystemConfiguration]) -> Self {
        let mut settings = Settings::default();
        for config in configurations {
            match (config.category.as_str(), config.key.as_str()) {
                ("ai", key) => settings.ai.apply(key, &config.value),
                ("scoring", "priority_thresholds") => {
                    if let Ok(t) = serde_json::from_value(config.value.clone()) {
                        settings.scoring.priority_thresholds = t;
                    }
                }
                ("scoring", "difficulty_weights") => {
                    if let Ok(w) = serde_json::from_value(config.value.clone()) {
                        settings.scoring.difficulty_weights = w;
                    }
                }
                _ => {}
            }
        }
        settings
    }

    /// Load from the store (global scope)
    pub async fn load(pool: &SqlitePool, environment: &str) -> Result<Self> {
        let configurations = list_configurations(pool, None, environment)
            .await?
            .into_iter()
            .filter(|c| c.scope == pulse_common::settings::DEFAULT_SCOPE)
            .collect::<Vec<_>>();
        Ok(Self::from_configurations(&configurations))
    }

    /// `load`, falling back to defaults when the store is temporarily unavailable
    pub async fn load_or_default(pool: &SqlitePool, environment: &str) -> Result<Self> {
        match Self::load(pool, environment).await {
            Ok(settings) => Ok(settings),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Settings load failed, using registry defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}

/// Shared, reloadable settings
#[derive(Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<Settings>,
    environment: String,
}

impl SettingsHandle {
    pub fn new(settings: Settings, environment: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(settings);
        Self {
            tx,
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Current AI parameters (copied)
    pub fn ai(&self) -> AiSettings {
        self.tx.borrow().ai.clone()
    }

    pub fn scoring(&self) -> ScoringSettings {
        self.tx.borrow().scoring.clone()
    }

    pub fn replace(&self, settings: Settings) {
        self.tx.send_replace(settings);
    }

    /// Notified after every reload
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Reload from the store
    ///
    /// On failure the previous values stay in place.
    pub async fn reload(&self, pool: &SqlitePool) -> Result<()> {
        let settings = Settings::load(pool, &self.environment).await?;
        if *self.tx.borrow() != settings {
            info!(
                model = %settings.ai.model,
                timeout_s = settings.ai.operation_timeout_seconds,
                max_tokens = settings.ai.max_tokens,
                "Runtime settings reloaded"
            );
        }
        self.replace(settings);
        Ok(())
    }

    /// Reload whenever configuration in this environment changes
    pub fn spawn_reload_listener(
        &self,
        pool: SqlitePool,
        event_bus: &EventBus,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        let mut rx = event_bus.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(PulseEvent::ConfigurationChanged { environment, category, key, .. }) => {
                            if environment != handle.environment {
                                continue;
                            }
                            debug!(%category, %key, "Configuration changed, reloading settings");
                            if let Err(e) = handle.reload(&pool).await {
                                warn!(error = %e, "Settings reload failed, keeping previous values");
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Missed events may include configuration changes
                            warn!(skipped, "Settings listener lagged, reloading");
                            if let Err(e) = handle.reload(&pool).await {
                                warn!(error = %e, "Settings reload failed, keeping previous values");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Settings reload listener stopped");
        })
    }
}

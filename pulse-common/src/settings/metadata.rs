//! Configuration metadata registry
//!
//! Single source of truth for every known `(category, key)`: description,
//! schema, business rules and default value. Unknown pairs are rejected by
//! the validator with `NotFound`.

use super::rules::BusinessRule;
use super::schema::ConfigSchema;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};

/// Chat models the provider client accepts, with their completion token limit
pub const SUPPORTED_MODELS: &[(&str, i64)] = &[
    ("gpt-4o", 16384),
    ("gpt-4o-mini", 16384),
    ("gpt-4-turbo", 4096),
    ("gpt-3.5-turbo", 4096),
];

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Completion token limit of a supported model
pub fn model_token_limit(model: &str) -> Option<i64> {
    SUPPORTED_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, limit)| *limit)
}

/// Declared metadata for one configuration key
#[derive(Debug, Clone, Serialize)]
pub struct ConfigMetadata {
    pub category: &'static str,
    pub key: &'static str,
    pub description: &'static str,
    pub schema: ConfigSchema,
    pub rules: Vec<BusinessRule>,
    pub default_value: Value,
}

impl ConfigMetadata {
    /// `category.key`
    pub fn path(&self) -> String {
        format!("{}.{}", self.category, self.key)
    }
}

const PRIORITY_LEVELS: [&str; 4] = ["critical", "high", "medium", "low"];
const DIFFICULTY_SIGNALS: [&str; 3] = ["length", "keywords", "context"];

static REGISTRY: Lazy<Vec<ConfigMetadata>> = Lazy::new(|| {
    let model_names: Vec<&str> = SUPPORTED_MODELS.iter().map(|(name, _)| *name).collect();
    let score = || ConfigSchema::number(0.0, 100.0);
    let weight = || ConfigSchema::number(0.0, 1.0);

    vec![
        ConfigMetadata {
            category: "ai",
            key: "model",
            description: "Chat completion model used for AI operations",
            schema: ConfigSchema::one_of(&model_names),
            rules: Vec::new(),
            default_value: json!(DEFAULT_MODEL),
        },
        ConfigMetadata {
            category: "ai",
            key: "max_tokens",
            description: "Maximum completion tokens per provider call",
            schema: ConfigSchema::integer(1, 32000),
            rules: Vec::new(),
            default_value: json!(2000),
        },
        ConfigMetadata {
            category: "ai",
            key: "temperature",
            description: "Sampling temperature",
            schema: ConfigSchema::number(0.0, 2.0),
            rules: Vec::new(),
            default_value: json!(0.7),
        },
        ConfigMetadata {
            category: "ai",
            key: "operation_timeout_seconds",
            description: "Wall-clock budget for a running operation",
            schema: ConfigSchema::integer(5, 600),
            rules: Vec::new(),
            default_value: json!(60),
        },
        ConfigMetadata {
            category: "ai",
            key: "worker_count",
            description: "Operations processed concurrently (takes effect on restart)",
            schema: ConfigSchema::integer(1, 16),
            rules: Vec::new(),
            default_value: json!(2),
        },
        ConfigMetadata {
            category: "ai",
            key: "max_queue_depth",
            description: "Queued operations accepted before new requests are rejected",
            schema: ConfigSchema::integer(1, 10000),
            rules: Vec::new(),
            default_value: json!(100),
        },
        ConfigMetadata {
            category: "ai",
            key: "completion_retention_seconds",
            description: "How long finished operations stay queryable",
            schema: ConfigSchema::integer(60, 86400),
            rules: Vec::new(),
            default_value: json!(3600),
        },
        ConfigMetadata {
            category: "ai",
            key: "requests_per_minute",
            description: "Provider rate limit, applied to operations queued after the change",
            schema: ConfigSchema::integer(1, 10000),
            rules: Vec::new(),
            default_value: json!(60),
        },
        ConfigMetadata {
            category: "scoring",
            key: "priority_thresholds",
            description: "Priority score thresholds for each band",
            schema: ConfigSchema::object(&[
                ("critical", score()),
                ("high", score()),
                ("medium", score()),
                ("low", score()),
            ]),
            rules: vec![
                BusinessRule::descending_order(&PRIORITY_LEVELS),
                BusinessRule::minimum_spread(&PRIORITY_LEVELS, 10.0),
            ],
            default_value: json!({"critical": 80, "high": 60, "medium": 40, "low": 20}),
        },
        ConfigMetadata {
            category: "scoring",
            key: "difficulty_weights",
            description: "Relative weight of each difficulty signal",
            schema: ConfigSchema::object(&[
                ("length", weight()),
                ("keywords", weight()),
                ("context", weight()),
            ]),
            rules: vec![BusinessRule::sum_equals(&DIFFICULTY_SIGNALS, 1.0, 0.01)],
            default_value: json!({"length": 0.3, "keywords": 0.4, "context": 0.3}),
        },
        ConfigMetadata {
            category: "issues",
            key: "heatmap_decay_days",
            description: "Days for an issue's heatmap score to decay by half",
            schema: ConfigSchema::integer(1, 365),
            rules: Vec::new(),
            default_value: json!(30),
        },
    ]
});

/// All registered configuration keys
pub fn registry() -> &'static [ConfigMetadata] {
    &REGISTRY
}

pub fn lookup(category: &str, key: &str) -> Option<&'static ConfigMetadata> {
    REGISTRY
        .iter()
        .find(|m| m.category == category && m.key == key)
}

/// Registered default, `Value::Null` for unknown keys
pub fn default_value(category: &str, key: &str) -> Value {
    lookup(category, key)
        .map(|m| m.default_value.clone())
        .unwrap_or(Value::Null)
}

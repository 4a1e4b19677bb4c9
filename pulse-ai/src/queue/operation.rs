//! Operation records, requests and snapshots

use crate::settings::AiSettings;
use chrono::{DateTime, Utc};
use pulse_common::auth::AuthenticatedUser;
use pulse_common::operations::{OperationPriority, OperationState, OperationType};
use pulse_common::scoring::DifficultyWeights;
use pulse_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Input characters per extra base duration
const CHARS_PER_DURATION_STEP: f64 = 4000.0;

/// Upper bound of the input-size scaling
const MAX_SIZE_FACTOR: f64 = 4.0;

/// Body of `POST /api/ai/async`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub input: Value,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub priority: OperationPriority,
    /// Client-chosen id, used to make retries of the same request idempotent
    #[serde(default)]
    pub operation_id: Option<Uuid>,
}

impl OperationRequest {
    pub fn new(operation_type: OperationType, input: Value) -> Self {
        Self {
            operation_type,
            input,
            context: None,
            priority: OperationPriority::Normal,
            operation_id: None,
        }
    }

    pub fn with_priority(mut self, priority: OperationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.operation_id = Some(id);
        self
    }

    /// Reject payloads the provider cannot do anything with
    pub fn check(&self) -> Result<()> {
        let empty = match &self.input {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        };
        if empty {
            return Err(Error::InvalidInput("input must not be empty".to_string()));
        }
        if let Some(context) = &self.context {
            if !context.is_object() && !context.is_null() {
                return Err(Error::InvalidInput("context must be an object".to_string()));
            }
        }
        Ok(())
    }
}

/// Returned to the caller on enqueue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReceipt {
    pub operation_id: Uuid,
    pub status: OperationState,
    /// Advisory estimate in milliseconds
    pub estimated_duration: u64,
}

/// Advisory duration: per-type base scaled by input size, adjusted by priority
pub fn estimate_duration(
    operation_type: OperationType,
    input: &Value,
    priority: OperationPriority,
) -> Duration {
    let chars = match input {
        Value::String(s) => s.chars().count(),
        other => other.to_string().len(),
    } as f64;
    let size_factor = (1.0 + chars / CHARS_PER_DURATION_STEP).min(MAX_SIZE_FACTOR);
    let priority_factor = match priority {
        OperationPriority::High => 0.8,
        OperationPriority::Normal => 1.0,
        OperationPriority::Low => 1.25,
    };
    operation_type
        .base_duration()
        .mul_f64(size_factor * priority_factor)
}

/// An operation owned by the queue
#[derive(Debug, Clone)]
pub struct AiOperation {
    pub id: Uuid,
    pub operation_type: OperationType,
    pub input: Value,
    pub context: Option<Value>,
    pub priority: OperationPriority,
    pub state: OperationState,
    pub requested_by: Uuid,
    /// Settings in force at enqueue; later changes do not apply
    pub settings: AiSettings,
    /// Scoring weights in force at enqueue, used for the prompt's estimate
    pub difficulty_weights: DifficultyWeights,
    pub estimated_duration: Duration,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub(crate) cancel_token: CancellationToken,
}

impl AiOperation {
    pub fn new(request: OperationRequest, requester: &AuthenticatedUser, settings: AiSettings) -> Self {
        let estimated_duration =
            estimate_duration(request.operation_type, &request.input, request.priority);
        Self {
            id: request.operation_id.unwrap_or_else(Uuid::new_v4),
            operation_type: request.operation_type,
            input: request.input,
            context: request.context,
            priority: request.priority,
            state: OperationState::Queued,
            requested_by: requester.user_id,
            settings,
            difficulty_weights: DifficultyWeights::default(),
            estimated_duration,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_difficulty_weights(mut self, weights: DifficultyWeights) -> Self {
        self.difficulty_weights = weights;
        self
    }

    /// Move to `next` if the lifecycle allows it, stamping timestamps
    pub(crate) fn transition(&mut self, next: OperationState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        match next {
            OperationState::Running => self.started_at = Some(now),
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
        self.state = next;
        true
    }

    pub fn receipt(&self) -> OperationReceipt {
        OperationReceipt {
            operation_id: self.id,
            status: self.state,
            estimated_duration: self.estimated_duration.as_millis() as u64,
        }
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            operation_id: self.id,
            operation_type: self.operation_type,
            priority: self.priority,
            status: self.state,
            requested_by: self.requested_by,
            estimated_duration: self.estimated_duration.as_millis() as u64,
            input: self.input.clone(),
            context: self.context.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            model: self.settings.model.clone(),
            timeout_seconds: self.settings.operation_timeout_seconds,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Point-in-time copy of an operation, as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSnapshot {
    pub operation_id: Uuid,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub priority: OperationPriority,
    pub status: OperationState,
    pub requested_by: Uuid,
    pub estimated_duration: u64,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Filter for `list_operations`
#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    pub state: Option<OperationState>,
    /// Only operations requested by this user
    pub requested_by: Option<Uuid>,
    pub limit: Option<usize>,
}

//! Event types and in-process event bus for Pulse
//!
//! Events are broadcast via `EventBus` and can be serialized for SSE
//! transmission. Configuration listeners use `ConfigurationChanged` to
//! reload their snapshot after a write.

use crate::operations::{OperationPriority, OperationState, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pulse event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PulseEvent {
    /// Operation accepted by the queue
    OperationQueued {
        operation_id: Uuid,
        operation_type: OperationType,
        priority: OperationPriority,
        requested_by: Uuid,
        estimated_duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Worker picked the operation up
    OperationStarted {
        operation_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Provider returned and the result was committed
    OperationCompleted {
        operation_id: Uuid,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Provider error or timeout
    OperationFailed {
        operation_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Cancelled while queued or running
    OperationCancelled {
        operation_id: Uuid,
        /// State the operation was in when cancelled
        previous_state: OperationState,
        timestamp: DateTime<Utc>,
    },

    /// A configuration value was written
    ///
    /// Triggers:
    /// - Runtime settings reload
    /// - SSE: admin dashboards
    ConfigurationChanged {
        category: String,
        key: String,
        environment: String,
        scope: String,
        version: i64,
        changed_by: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl PulseEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            PulseEvent::OperationQueued { .. } => "OperationQueued",
            PulseEvent::OperationStarted { .. } => "OperationStarted",
            PulseEvent::OperationCompleted { .. } => "OperationCompleted",
            PulseEvent::OperationFailed { .. } => "OperationFailed",
            PulseEvent::OperationCancelled { .. } => "OperationCancelled",
            PulseEvent::ConfigurationChanged { .. } => "ConfigurationChanged",
        }
    }

    /// Operation this event concerns, if any
    pub fn operation_id(&self) -> Option<Uuid> {
        match self {
            PulseEvent::OperationQueued { operation_id, .. }
            | PulseEvent::OperationStarted { operation_id, .. }
            | PulseEvent::OperationCompleted { operation_id, .. }
            | PulseEvent::OperationFailed { operation_id, .. }
            | PulseEvent::OperationCancelled { operation_id, .. } => Some(*operation_id),
            PulseEvent::ConfigurationChanged { .. } => None,
        }
    }
}

/// Broadcast bus for `PulseEvent`
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PulseEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PulseEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PulseEvent,
    ) -> Result<usize, broadcast::error::SendError<PulseEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PulseEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_emitted_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        let delivered = bus
            .emit(PulseEvent::OperationStarted {
                operation_id: id,
                timestamp: Utc::now(),
            })
            .unwrap();
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "OperationStarted");
        assert_eq!(event.operation_id(), Some(id));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        let event = PulseEvent::OperationStarted {
            operation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let event = PulseEvent::ConfigurationChanged {
            category: "ai".into(),
            key: "max_tokens".into(),
            environment: "production".into(),
            scope: "global".into(),
            version: 3,
            changed_by: Uuid::nil(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ConfigurationChanged");
        assert_eq!(json["version"], 3);
        assert_eq!(event.operation_id(), None);
    }
}

//! Asynchronous AI operation queue
//!
//! One logical queue with a bounded worker pool. Operations are accepted
//! immediately, ordered `high > normal > low` (FIFO within a class) and owned
//! by the queue until they reach a terminal state. Terminal operations stay
//! queryable in memory for the completion retention window, and in the
//! `ai_operations` audit table afterwards.
//!
//! ```text
//! queue_operation ──► pending ──claim_next──► running ──► completed | failed
//!                        │                       │
//!                        └──── cancel ◄──────────┘
//! ```

mod operation;
mod pending;
mod worker;

pub use operation::{
    estimate_duration, AiOperation, OperationFilter, OperationReceipt, OperationRequest,
    OperationSnapshot,
};

use crate::db::operations::{load_operation, save_operation};
use crate::provider::AiProvider;
use crate::settings::SettingsHandle;
use chrono::Utc;
use pending::PendingQueue;
use pulse_common::auth::AuthenticatedUser;
use pulse_common::events::{EventBus, PulseEvent};
use pulse_common::operations::OperationState;
use pulse_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest pause between garbage-collection sweeps
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Moved from the given state to `cancelled`
    Cancelled(OperationState),
    /// Already completed, failed or cancelled
    AlreadyTerminal(OperationState),
    NotFound,
}

#[derive(Default)]
struct QueueState {
    operations: HashMap<Uuid, AiOperation>,
    pending: PendingQueue,
}

/// Operation queue and its worker pool
pub struct OperationQueue {
    state: Mutex<QueueState>,
    work_available: Notify,
    provider: Arc<dyn AiProvider>,
    settings: SettingsHandle,
    event_bus: EventBus,
    db: SqlitePool,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    last_error: RwLock<Option<String>>,
}

impl OperationQueue {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        settings: SettingsHandle,
        event_bus: EventBus,
        db: SqlitePool,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            work_available: Notify::new(),
            provider,
            settings,
            event_bus,
            db,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            last_error: RwLock::new(None),
        }
    }

    /// Accept an operation and return without waiting for it
    ///
    /// Snapshots the current AI settings and scoring weights; later
    /// configuration changes do not affect this operation.
    pub async fn queue_operation(
        &self,
        request: OperationRequest,
        requester: &AuthenticatedUser,
    ) -> Result<OperationReceipt> {
        request.check()?;
        let settings = self.settings.ai();
        let max_depth = settings.max_queue_depth;
        let operation = AiOperation::new(request, requester, settings)
            .with_difficulty_weights(self.settings.scoring().difficulty_weights);

        let receipt = {
            let mut state = self.state.lock().await;
            if state.operations.contains_key(&operation.id) {
                return Err(Error::Conflict(format!(
                    "Operation {} already exists",
                    operation.id
                )));
            }
            if state.pending.len() >= max_depth {
                return Err(Error::Transient(format!(
                    "Operation queue is full ({} pending)",
                    max_depth
                )));
            }
            state.pending.push(operation.id, operation.priority);
            let receipt = operation.receipt();
            state.operations.insert(operation.id, operation.clone());
            receipt
        };

        info!(
            operation_id = %operation.id,
            operation_type = %operation.operation_type,
            priority = %operation.priority,
            requested_by = %operation.requested_by,
            estimated_ms = receipt.estimated_duration,
            "Operation queued"
        );

        self.event_bus.emit_lossy(PulseEvent::OperationQueued {
            operation_id: operation.id,
            operation_type: operation.operation_type,
            priority: operation.priority,
            requested_by: operation.requested_by,
            estimated_duration_ms: receipt.estimated_duration,
            timestamp: operation.created_at,
        });
        self.record(&operation).await;
        self.work_available.notify_one();

        Ok(receipt)
    }

    /// Move the next queued operation to `running`
    ///
    /// Each id is handed out at most once; an id whose operation already left
    /// `queued` is dropped.
    pub async fn claim_next(&self) -> Option<AiOperation> {
        let claimed = {
            let mut state = self.state.lock().await;
            loop {
                let id = state.pending.pop()?;
                let Some(operation) = state.operations.get_mut(&id) else {
                    continue;
                };
                if operation.transition(OperationState::Running) {
                    break operation.clone();
                }
            }
        };

        debug!(operation_id = %claimed.id, "Operation claimed");
        self.event_bus.emit_lossy(PulseEvent::OperationStarted {
            operation_id: claimed.id,
            timestamp: claimed.started_at.unwrap_or_else(Utc::now),
        });
        self.record(&claimed).await;
        Some(claimed)
    }

    /// Cancel a queued or running operation
    ///
    /// A running operation's token is fired; whatever the provider returns
    /// afterwards is discarded.
    pub async fn cancel(&self, id: Uuid) -> CancelOutcome {
        let (previous, operation) = {
            let mut state = self.state.lock().await;
            let Some(operation) = state.operations.get_mut(&id) else {
                return CancelOutcome::NotFound;
            };
            let previous = operation.state;
            if !operation.transition(OperationState::Cancelled) {
                return CancelOutcome::AlreadyTerminal(previous);
            }
            operation.cancel_token.cancel();
            let operation = operation.clone();
            if previous == OperationState::Queued {
                state.pending.retain(|pending_id| *pending_id != id);
            }
            (previous, operation)
        };

        info!(operation_id = %id, previous_state = %previous, "Operation cancelled");
        self.event_bus.emit_lossy(PulseEvent::OperationCancelled {
            operation_id: id,
            previous_state: previous,
            timestamp: operation.completed_at.unwrap_or_else(Utc::now),
        });
        self.record(&operation).await;
        CancelOutcome::Cancelled(previous)
    }

    /// `true` when the operation moved to `cancelled`, `false` if unknown or terminal
    pub async fn cancel_operation(&self, id: Uuid) -> bool {
        matches!(self.cancel(id).await, CancelOutcome::Cancelled(_))
    }

    /// Commit a worker's outcome
    ///
    /// Returns `false` when the operation is no longer running (cancelled in
    /// the meantime); the outcome is then dropped.
    pub(crate) async fn finish(&self, id: Uuid, outcome: std::result::Result<String, String>) -> bool {
        let operation = {
            let mut state = self.state.lock().await;
            let Some(operation) = state.operations.get_mut(&id) else {
                return false;
            };
            let next = match outcome {
                Ok(_) => OperationState::Completed,
                Err(_) => OperationState::Failed,
            };
            if operation.state != OperationState::Running || !operation.transition(next) {
                return false;
            }
            match outcome {
                Ok(text) => operation.result = Some(text),
                Err(message) => operation.error = Some(message),
            }
            operation.clone()
        };

        let timestamp = operation.completed_at.unwrap_or_else(Utc::now);
        match operation.state {
            OperationState::Completed => {
                let duration_ms = operation
                    .started_at
                    .map(|started| (timestamp - started).num_milliseconds().max(0) as u64)
                    .unwrap_or(0);
                info!(operation_id = %id, duration_ms, "Operation completed");
                self.event_bus.emit_lossy(PulseEvent::OperationCompleted {
                    operation_id: id,
                    duration_ms,
                    timestamp,
                });
            }
            _ => {
                let error = operation.error.clone().unwrap_or_default();
                warn!(operation_id = %id, %error, "Operation failed");
                *self.last_error.write().await = Some(error.clone());
                self.event_bus.emit_lossy(PulseEvent::OperationFailed {
                    operation_id: id,
                    error,
                    timestamp,
                });
            }
        }
        self.record(&operation).await;
        true
    }

    /// In-memory snapshot, falling back to the audit trail
    pub async fn get_operation(&self, id: Uuid) -> Result<Option<OperationSnapshot>> {
        if let Some(operation) = self.state.lock().await.operations.get(&id) {
            return Ok(Some(operation.snapshot()));
        }
        load_operation(&self.db, id).await
    }

    /// Snapshots of operations still held in memory, newest first
    pub async fn list_operations(&self, filter: &OperationFilter) -> Vec<OperationSnapshot> {
        let state = self.state.lock().await;
        let mut snapshots: Vec<OperationSnapshot> = state
            .operations
            .values()
            .filter(|op| filter.state.map_or(true, |s| op.state == s))
            .filter(|op| filter.requested_by.map_or(true, |u| op.requested_by == u))
            .map(AiOperation::snapshot)
            .collect();
        drop(state);

        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            snapshots.truncate(limit);
        }
        snapshots
    }

    /// Queued operations, cancelled entries excluded
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Most recent operation failure, shown on `/health`
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Drop terminal operations older than the retention window
    pub async fn purge_completed(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let cutoff = Utc::now() - retention;
        let mut state = self.state.lock().await;
        let before = state.operations.len();
        state.operations.retain(|_, op| {
            !(op.state.is_terminal() && op.completed_at.is_some_and(|at| at <= cutoff))
        });
        before - state.operations.len()
    }

    /// Spawn the worker pool and the garbage-collection sweeper
    ///
    /// Worker count comes from the settings in force at start.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            warn!("Operation queue already started");
            return;
        }

        let worker_count = self.settings.ai().worker_count.max(1);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(self);
            tasks.push(tokio::spawn(async move { queue.run_worker(worker_id).await }));
        }

        let queue = Arc::clone(self);
        tasks.push(tokio::spawn(async move { queue.run_sweeper().await }));

        info!(worker_count, provider = self.provider.name(), "Operation queue started");
    }

    /// Stop workers and the sweeper, waiting for them to exit
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Queue task ended abnormally");
            }
        }
        info!("Operation queue stopped");
    }

    async fn run_sweeper(&self) {
        loop {
            let retention = self.settings.ai().completion_retention();
            let interval = retention.min(MAX_SWEEP_INTERVAL);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let purged = self.purge_completed(retention).await;
                    if purged > 0 {
                        debug!(purged, "Purged finished operations from memory");
                    }
                }
            }
        }
    }

    /// Best-effort audit write
    async fn record(&self, operation: &AiOperation) {
        if let Err(e) = save_operation(&self.db, operation).await {
            warn!(operation_id = %operation.id, error = %e, "Audit write failed");
        }
    }
}

//! AI operation endpoints
//!
//! POST /api/ai/async, POST /api/ai/cancel, GET /api/ai/operations[/{id}],
//! GET /api/ai/events (SSE)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::stream::Stream;
use pulse_common::auth::{AuthenticatedUser, Role};
use pulse_common::events::PulseEvent;
use pulse_common::operations::OperationState;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::queue::{
    CancelOutcome, OperationFilter, OperationReceipt, OperationRequest, OperationSnapshot,
};
use crate::AppState;

/// Default page size for GET /api/ai/operations
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// POST /api/ai/cancel request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub operation_id: Uuid,
}

/// POST /api/ai/cancel response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub operation_id: Uuid,
    pub status: OperationState,
}

/// GET /api/ai/operations query
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub state: Option<OperationState>,
    pub limit: Option<usize>,
}

/// POST /api/ai/async
///
/// Accepts the operation and returns 202 with its id; the work happens in
/// the background.
pub async fn queue_operation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<OperationRequest>,
) -> ApiResult<(StatusCode, Json<OperationReceipt>)> {
    user.require(Role::Member)?;
    let receipt = state.queue.queue_operation(request, &user).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// POST /api/ai/cancel
///
/// 404 for unknown operations, 409 once an operation is terminal. Only the
/// requester or an admin may cancel.
pub async fn cancel_operation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<CancelResponse>> {
    let id = request.operation_id;
    let operation = state
        .queue
        .get_operation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Operation not found: {}", id)))?;

    if !user.can_act_for(operation.requested_by) {
        return Err(ApiError::Forbidden(
            "Only the requester or an admin can cancel this operation".to_string(),
        ));
    }

    match state.queue.cancel(id).await {
        CancelOutcome::Cancelled(_) => Ok(Json(CancelResponse {
            operation_id: id,
            status: OperationState::Cancelled,
        })),
        CancelOutcome::AlreadyTerminal(current) => Err(ApiError::Conflict(format!(
            "Operation {} is already {}",
            id, current
        ))),
        // Known to the audit trail only: purged after it finished
        CancelOutcome::NotFound => Err(ApiError::Conflict(format!(
            "Operation {} is already {}",
            id, operation.status
        ))),
    }
}

/// GET /api/ai/operations/{id}
pub async fn get_operation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OperationSnapshot>> {
    let operation = state
        .queue
        .get_operation(id)
        .await?
        .filter(|op| user.can_act_for(op.requested_by))
        .ok_or_else(|| ApiError::NotFound(format!("Operation not found: {}", id)))?;
    Ok(Json(operation))
}

/// GET /api/ai/operations
///
/// Callers see their own operations; admins see everyone's.
pub async fn list_operations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<OperationSnapshot>> {
    let filter = OperationFilter {
        state: query.state,
        requested_by: (!user.has_role(Role::Admin)).then_some(user.user_id),
        limit: Some(query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)),
    };
    Json(state.queue.list_operations(&filter).await)
}

/// GET /api/ai/events - SSE stream of operation events
///
/// Non-admins only receive events for their own operations.
pub async fn operation_event_stream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = %user.user_id, "New SSE client connected to operation events");

    let mut rx = state.event_bus.subscribe();
    let queue = state.queue.clone();
    let is_admin = user.has_role(Role::Admin);

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    let event = match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE: client lagged, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    let Some(operation_id) = event.operation_id() else {
                        continue;
                    };

                    let visible = is_admin || match &event {
                        PulseEvent::OperationQueued { requested_by, .. } => *requested_by == user.user_id,
                        _ => matches!(
                            queue.get_operation(operation_id).await,
                            Ok(Some(op)) if op.requested_by == user.user_id
                        ),
                    };
                    if !visible {
                        continue;
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!(event_type, %operation_id, "SSE: forwarding operation event");
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Build AI operation routes
pub fn ai_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ai/async", post(queue_operation))
        .route("/api/ai/cancel", post(cancel_operation))
        .route("/api/ai/operations", get(list_operations))
        .route("/api/ai/operations/:id", get(get_operation))
        .route("/api/ai/events", get(operation_event_stream))
}

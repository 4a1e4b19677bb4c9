//! AI operation audit trail
//!
//! One row per operation in `ai_operations`, upserted on every lifecycle
//! change. The stored state never moves backwards. The in-memory queue stays authoritative; the table outlives the
//! completion retention window.

use crate::queue::{AiOperation, OperationSnapshot};
use crate::settings::AiSettings;
use pulse_common::db::{parse_json, parse_timestamp, parse_uuid, retry_on_lock, to_json};
use pulse_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Audit writes give up quickly; the queue never waits on them for long
const AUDIT_MAX_WAIT_MS: u64 = 1000;

/// Prepared column values of one audit row
struct OperationRow {
    id: String,
    operation_type: &'static str,
    priority: &'static str,
    state: &'static str,
    requested_by: String,
    input: String,
    context: Option<String>,
    settings: String,
    estimated_duration_ms: i64,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl OperationRow {
    fn prepare(operation: &AiOperation) -> Result<Self> {
        Ok(Self {
            id: operation.id.to_string(),
            operation_type: operation.operation_type.as_str(),
            priority: operation.priority.as_str(),
            state: operation.state.as_str(),
            requested_by: operation.requested_by.to_string(),
            input: to_json("input", &operation.input)?,
            context: operation
                .context
                .as_ref()
                .map(|c| to_json("context", c))
                .transpose()?,
            settings: to_json("settings", &operation.settings)?,
            estimated_duration_ms: operation.estimated_duration.as_millis() as i64,
            result: operation.result.clone(),
            error: operation.error.clone(),
            created_at: operation.created_at.to_rfc3339(),
            started_at: operation.started_at.map(|dt| dt.to_rfc3339()),
            completed_at: operation.completed_at.map(|dt| dt.to_rfc3339()),
        })
    }
}

/// Insert or update the audit row for an operation
///
/// Writes land in whatever order their tasks get the pool, so an update only
/// applies when it moves the row forward (`queued < running < terminal`).
/// A stale write is silently ignored.
pub async fn save_operation(pool: &SqlitePool, operation: &AiOperation) -> Result<()> {
    // Prepare all data before touching the pool
    let row = &OperationRow::prepare(operation)?;
    retry_on_lock("save_operation", AUDIT_MAX_WAIT_MS, || upsert_row(pool, row)).await
}

async fn upsert_row(pool: &SqlitePool, row: &OperationRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ai_operations (
            id, operation_type, priority, state, requested_by, input, context,
            settings, estimated_duration_ms, result, error, created_at, started_at,
            completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            state = excluded.state,
            result = excluded.result,
            error = excluded.error,
            started_at = excluded.started_at,
            completed_at = excluded.completed_at
        WHERE (CASE excluded.state WHEN 'queued' THEN 0 WHEN 'running' THEN 1 ELSE 2 END)
            > (CASE ai_operations.state WHEN 'queued' THEN 0 WHEN 'running' THEN 1 ELSE 2 END)
        "#,
    )
    .bind(&row.id)
    .bind(row.operation_type)
    .bind(row.priority)
    .bind(row.state)
    .bind(&row.requested_by)
    .bind(&row.input)
    .bind(&row.context)
    .bind(&row.settings)
    .bind(row.estimated_duration_ms)
    .bind(&row.result)
    .bind(&row.error)
    .bind(&row.created_at)
    .bind(&row.started_at)
    .bind(&row.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load an operation from the audit trail
pub async fn load_operation(pool: &SqlitePool, id: Uuid) -> Result<Option<OperationSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT id, operation_type, priority, state, requested_by, input, context, settings,
               estimated_duration_ms, result, error, created_at, started_at, completed_at
        FROM ai_operations
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(snapshot_from_row).transpose()
}

fn snapshot_from_row(row: &SqliteRow) -> Result<OperationSnapshot> {
    let id: String = row.get("id");
    let operation_type: String = row.get("operation_type");
    let priority: String = row.get("priority");
    let state: String = row.get("state");
    let requested_by: String = row.get("requested_by");
    let input: String = row.get("input");
    let context: Option<String> = row.get("context");
    let settings: String = row.get("settings");
    let estimated_duration_ms: i64 = row.get("estimated_duration_ms");
    let created_at: String = row.get("created_at");
    let started_at: Option<String> = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    let settings: AiSettings = parse_json("settings", &settings)?;

    Ok(OperationSnapshot {
        operation_id: parse_uuid("id", &id)?,
        operation_type: operation_type.parse()?,
        priority: priority.parse()?,
        status: state.parse()?,
        requested_by: parse_uuid("requested_by", &requested_by)?,
        estimated_duration: estimated_duration_ms.max(0) as u64,
        input: parse_json("input", &input)?,
        context: context.as_deref().map(|c| parse_json("context", c)).transpose()?,
        result: row.get("result"),
        error: row.get("error"),
        model: settings.model,
        timeout_seconds: settings.operation_timeout_seconds,
        created_at: parse_timestamp("created_at", &created_at)?,
        started_at: started_at
            .as_deref()
            .map(|s| parse_timestamp("started_at", s))
            .transpose()?,
        completed_at: completed_at
            .as_deref()
            .map(|s| parse_timestamp("completed_at", s))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OperationRequest;
    use pulse_common::auth::{AuthenticatedUser, Role};
    use pulse_common::db::connect_in_memory;
    use pulse_common::operations::{OperationState, OperationType};
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_tracks_lifecycle() {
        let pool = connect_in_memory().await.unwrap();
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            display_name: "Ana".into(),
            role: Role::Member,
        };
        let request = OperationRequest::new(OperationType::IssueAnalysis, json!("Printer offline"))
            .with_context(json!({"industry": "retail"}));
        let mut op = AiOperation::new(request, &user, AiSettings::default());

        save_operation(&pool, &op).await.unwrap();
        let stored = load_operation(&pool, op.id).await.unwrap().unwrap();
        assert_eq!(stored, op.snapshot());

        op.transition(OperationState::Running);
        op.result = Some("done".into());
        op.transition(OperationState::Completed);
        save_operation(&pool, &op).await.unwrap();

        let stored = load_operation(&pool, op.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationState::Completed);
        assert_eq!(stored.result.as_deref(), Some("done"));
        assert!(stored.completed_at.is_some());

        assert!(load_operation(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_write_does_not_regress_row() {
        let pool = connect_in_memory().await.unwrap();
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            display_name: "Ana".into(),
            role: Role::Member,
        };
        let request = OperationRequest::new(OperationType::Clustering, json!(["a", "b"]));
        let queued = AiOperation::new(request, &user, AiSettings::default());
        let mut running = queued.clone();
        running.transition(OperationState::Running);
        let mut completed = running.clone();
        completed.result = Some("two clusters".into());
        completed.transition(OperationState::Completed);

        // Terminal write lands first, the earlier ones arrive late
        save_operation(&pool, &completed).await.unwrap();
        save_operation(&pool, &queued).await.unwrap();
        save_operation(&pool, &running).await.unwrap();

        let stored = load_operation(&pool, queued.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationState::Completed);
        assert_eq!(stored.result.as_deref(), Some("two clusters"));
        assert!(stored.completed_at.is_some());

        // Running after queued still applies
        let request = OperationRequest::new(OperationType::Insights, json!("portfolio"));
        let mut op = AiOperation::new(request, &user, AiSettings::default());
        save_operation(&pool, &op).await.unwrap();
        op.transition(OperationState::Running);
        save_operation(&pool, &op).await.unwrap();
        let stored = load_operation(&pool, op.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationState::Running);
        assert!(stored.started_at.is_some());
    }
}

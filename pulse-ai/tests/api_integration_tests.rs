//! HTTP API integration tests
//!
//! Exercise the router end to end against an in-memory database. Workers are
//! left stopped unless a test needs operations to run.

mod helpers;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use helpers::{eventually, user, wait_for_state, ScriptedProvider, TestApp};
use pulse_common::auth::Role;
use pulse_common::operations::OperationState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;

async fn app() -> TestApp {
    TestApp::new(Arc::new(ScriptedProvider::replying("ok")), |_| {}).await
}

fn analysis_body(text: &str) -> Value {
    json!({"type": "issue_analysis", "input": text})
}

fn operation_id(body: &Value) -> Uuid {
    body["operationId"].as_str().unwrap().parse().unwrap()
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = app().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "pulse-ai");
    assert!(body["last_error"].is_null());
    app.shutdown().await;
}

#[tokio::test]
async fn test_api_rejects_missing_or_unknown_token() {
    let app = app().await;

    let (status, body) = app.send(Method::GET, "/api/ai/operations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.get("/api/ai/operations", "not-a-session").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    app.shutdown().await;
}

// =============================================================================
// AI operations
// =============================================================================

#[tokio::test]
async fn test_member_enqueue_returns_accepted_receipt() {
    let app = app().await;
    let (status, body) = app
        .post("/api/ai/async", &app.member_token, analysis_body("Checkout is slow"))
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert!(body["estimatedDuration"].as_u64().unwrap() > 0);

    let snapshot = app.queue.get_operation(operation_id(&body)).await.unwrap().unwrap();
    assert_eq!(snapshot.requested_by, app.member.user_id);
    app.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_rejects_viewer_and_bad_input() {
    let app = app().await;

    let (status, _) = app
        .post("/api/ai/async", &app.viewer_token, analysis_body("hello"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/api/ai/async",
            &app.member_token,
            json!({"type": "fortune_telling", "input": "x"}),
        )
        .await;
    assert!(status.is_client_error());

    let (status, body) = app
        .post("/api/ai/async", &app.member_token, analysis_body(""))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    assert_eq!(app.queue.pending_count().await, 0);
    app.shutdown().await;
}

#[tokio::test]
async fn test_full_queue_is_temporarily_unavailable() {
    let app = TestApp::new(Arc::new(ScriptedProvider::replying("ok")), |s| {
        s.ai.max_queue_depth = 1;
    })
    .await;

    let (status, _) = app.post("/api/ai/async", &app.member_token, analysis_body("one")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, body) = app.post("/api/ai/async", &app.member_token, analysis_body("two")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "TEMPORARILY_UNAVAILABLE");
    app.shutdown().await;
}

#[tokio::test]
async fn test_cancel_queued_then_conflict() {
    let app = app().await;
    let (_, body) = app
        .post("/api/ai/async", &app.member_token, analysis_body("cancel me"))
        .await;
    let id = operation_id(&body);

    let (status, body) = app
        .post("/api/ai/cancel", &app.member_token, json!({"operationId": id}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = app
        .post("/api/ai/cancel", &app.member_token, json!({"operationId": id}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].as_str().unwrap().contains("cancelled"));

    let (status, _) = app
        .post("/api/ai/cancel", &app.member_token, json!({"operationId": Uuid::new_v4()}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.shutdown().await;
}

#[tokio::test]
async fn test_only_requester_or_admin_can_cancel() {
    let app = app().await;
    let (_, body) = app
        .post("/api/ai/async", &app.member_token, analysis_body("mine"))
        .await;
    let id = operation_id(&body);

    let other = user(Role::Member, "Other");
    let other_token = app.token_for(&other).await;
    let (status, _) = app
        .post("/api/ai/cancel", &other_token, json!({"operationId": id}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/api/ai/cancel", &app.admin_token, json!({"operationId": id}))
        .await;
    assert_eq!(status, StatusCode::OK);
    app.shutdown().await;
}

#[tokio::test]
async fn test_completed_operation_cannot_be_cancelled() {
    let app = app().await;
    app.queue.start().await;
    let (_, body) = app
        .post("/api/ai/async", &app.member_token, analysis_body("quick"))
        .await;
    let id = operation_id(&body);
    wait_for_state(&app.queue, id, OperationState::Completed, Duration::from_secs(5)).await;

    let (status, _) = app
        .post("/api/ai/cancel", &app.member_token, json!({"operationId": id}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.get(&format!("/api/ai/operations/{}", id), &app.member_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"], "ok");
    app.shutdown().await;
}

#[tokio::test]
async fn test_operations_are_visible_to_owner_and_admin_only() {
    let app = app().await;
    let (_, body) = app
        .post("/api/ai/async", &app.member_token, analysis_body("private"))
        .await;
    let id = operation_id(&body);
    let uri = format!("/api/ai/operations/{}", id);

    let other = user(Role::Member, "Other");
    let other_token = app.token_for(&other).await;
    let (_, _) = app
        .post("/api/ai/async", &other_token, analysis_body("someone else"))
        .await;

    let (status, _) = app.get(&uri, &other_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app.get(&uri, &app.admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "issue_analysis");

    let (_, mine) = app.get("/api/ai/operations", &app.member_token).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, all) = app.get("/api/ai/operations", &app.admin_token).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
    let (_, running) = app.get("/api/ai/operations?state=running", &app.admin_token).await;
    assert!(running.as_array().unwrap().is_empty());
    app.shutdown().await;
}

#[tokio::test]
async fn test_event_stream_accepts_query_token() {
    let app = app().await;
    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/ai/events?token={}", app.member_token))
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    drop(response);
    app.shutdown().await;
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_validate_reports_business_rule_failures() {
    let app = app().await;
    let body = json!({
        "category": "scoring",
        "key": "priority_thresholds",
        "value": {"critical": 50, "high": 60, "medium": 30, "low": 10}
    });

    let (status, result) = app.post("/api/config/validate", &app.admin_token, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["valid"], false);
    assert!(result["errors"][0].as_str().unwrap().contains("descending_order"));

    let (status, _) = app.post("/api/config/validate", &app.member_token, body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    app.shutdown().await;
}

#[tokio::test]
async fn test_endpoint_runs_only_after_validation_passes() {
    let app = app().await;

    let (status, body) = app
        .post(
            "/api/config/test",
            &app.admin_token,
            json!({"category": "ai", "key": "operation_timeout_seconds", "value": 7}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validation"]["valid"], true);
    assert_eq!(body["test"]["passed"], false);

    let (_, body) = app
        .post(
            "/api/config/test",
            &app.admin_token,
            json!({"category": "ai", "key": "operation_timeout_seconds", "value": 1}),
        )
        .await;
    assert_eq!(body["validation"]["valid"], false);
    assert!(body.get("test").is_none());
    app.shutdown().await;
}

#[tokio::test]
async fn test_update_bumps_version_and_reloads_settings() {
    let app = app().await;
    assert_eq!(app.settings.ai().operation_timeout_seconds, 60);

    let (status, body) = app
        .put(
            "/api/config/ai/operation_timeout_seconds",
            &app.admin_token,
            json!({"value": 30, "expectedVersion": 1, "reason": "faster failures"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);
    assert_eq!(body["value"], 30);
    assert!(body["warnings"].is_array());

    let settings = app.settings.clone();
    assert!(
        eventually(Duration::from_secs(2), || settings.ai().operation_timeout_seconds == 30).await
    );

    let (status, body) = app
        .get("/api/config/ai/operation_timeout_seconds", &app.viewer_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);

    let (status, _) = app
        .put(
            "/api/config/ai/operation_timeout_seconds",
            &app.admin_token,
            json!({"value": 45, "expectedVersion": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    app.shutdown().await;
}

#[tokio::test]
async fn test_update_rejects_invalid_value_and_non_admin() {
    let app = app().await;

    let (status, body) = app
        .put(
            "/api/config/ai/operation_timeout_seconds",
            &app.admin_token,
            json!({"value": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(!body["error"]["details"].as_array().unwrap().is_empty());

    let (status, _) = app
        .put(
            "/api/config/ai/operation_timeout_seconds",
            &app.member_token,
            json!({"value": 30}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app
        .get("/api/config/ai/operation_timeout_seconds", &app.viewer_token)
        .await;
    assert_eq!(body["version"], 1);
    app.shutdown().await;
}

#[tokio::test]
async fn test_get_and_list_configuration() {
    let app = app().await;

    let (status, body) = app.get("/api/config?category=scoring", &app.viewer_token).await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["key"].as_str().unwrap())
        .collect();
    assert!(keys.contains(&"priority_thresholds"));
    assert!(keys.contains(&"difficulty_weights"));

    let (status, _) = app
        .get("/api/config/ai/model?environment=staging", &app.viewer_token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.shutdown().await;
}

#[tokio::test]
async fn test_history_lists_newest_changes_for_admins() {
    let app = app().await;
    for value in [20, 25, 30] {
        let (status, _) = app
            .put(
                "/api/config/ai/operation_timeout_seconds",
                &app.admin_token,
                json!({"value": value}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .get(
            "/api/config/history?category=ai&key=operation_timeout_seconds&limit=2",
            &app.admin_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let changes = body.as_array().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0]["newValue"], 30);
    assert_eq!(changes[0]["oldValue"], 25);

    let (status, _) = app.get("/api/config/history", &app.member_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    app.shutdown().await;
}

// =============================================================================
// Scoring
// =============================================================================

#[tokio::test]
async fn test_scoring_free_initiative_has_maximal_roi() {
    let app = app().await;
    let (status, body) = app
        .post(
            "/api/scoring/initiative",
            &app.member_token,
            json!({
                "title": "Fix typo",
                "problemStatement": "Login page typo",
                "goal": "Correct copy",
                "cost": 0,
                "gain": 10
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roi"], 100.0);
    let difficulty = body["difficulty"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&difficulty));
    let priority = body["priorityScore"].as_f64().unwrap();
    assert!((priority - (100.0 - difficulty / 2.0)).abs() < 1e-9);
    assert!(body["band"].is_string());

    let (status, _) = app
        .post("/api/scoring/initiative", &app.viewer_token, json!({"cost": 1}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    app.shutdown().await;
}

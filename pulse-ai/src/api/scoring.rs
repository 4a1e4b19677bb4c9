//! Scoring endpoint
//!
//! Scores an initiative proposal with the configured difficulty weights and
//! classifies it with the configured priority thresholds. Scoring never fails;
//! odd numbers are sanitized.

use axum::{extract::State, routing::post, Extension, Json, Router};
use pulse_common::auth::{AuthenticatedUser, Role};
use pulse_common::models::{InitiativeDraft, Issue};
use pulse_common::scoring::{BusinessContext, PriorityBand};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;
use crate::AppState;

/// POST /api/scoring/initiative request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreInitiativeRequest {
    pub title: String,
    pub problem_statement: String,
    pub goal: String,
    pub cost: f64,
    pub gain: f64,
    /// Free-form business context; unknown fields are ignored
    pub context: Option<Value>,
    /// Descriptions of the source issues, folded into the difficulty estimate
    pub issue_descriptions: Vec<String>,
}

/// POST /api/scoring/initiative response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreInitiativeResponse {
    pub difficulty: f64,
    pub roi: f64,
    /// `roi - difficulty / 2`, not clamped
    pub priority_score: f64,
    pub band: PriorityBand,
}

/// POST /api/scoring/initiative
pub async fn score_initiative(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<ScoreInitiativeRequest>,
) -> ApiResult<Json<ScoreInitiativeResponse>> {
    user.require(Role::Member)?;
    let scoring = state.settings.scoring();

    let draft = InitiativeDraft {
        title: request.title,
        problem_statement: request.problem_statement,
        goal: request.goal,
        cost: request.cost,
        gain: request.gain,
        context: request
            .context
            .as_ref()
            .map(BusinessContext::from_json_lenient)
            .unwrap_or_default(),
    };
    let issues: Vec<Issue> = request
        .issue_descriptions
        .into_iter()
        .map(|description| Issue::new(description, user.user_id))
        .collect();

    let scores = draft.scores_weighted(&issues, &scoring.difficulty_weights);
    Ok(Json(ScoreInitiativeResponse {
        difficulty: scores.difficulty(),
        roi: scores.roi(),
        priority_score: scores.priority_score(),
        band: scoring.priority_thresholds.classify(scores.priority_score()),
    }))
}

/// Build scoring routes
pub fn scoring_routes() -> Router<AppState> {
    Router::new().route("/api/scoring/initiative", post(score_initiative))
}

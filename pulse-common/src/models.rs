//! Domain models shared across Pulse services
//!
//! Issues are reported problems; initiatives are planned efforts addressing
//! one or more issues. Initiative scores are private so difficulty, ROI and
//! priority can only change together.

use crate::auth::{AuthenticatedUser, Role};
use crate::scoring::{clamp_score, BusinessContext, DifficultyWeights, Scores};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issue triage status. Issues are archived, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Clustered,
    Converted,
    Archived,
}

/// A reported operational problem awaiting triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: Uuid,
    pub description: String,
    pub votes: u32,
    /// Severity/urgency rating in [0, 100]
    pub heatmap_score: f64,
    pub cluster_id: Option<Uuid>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub status: IssueStatus,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(description: impl Into<String>, reported_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            votes: 0,
            heatmap_score: 0.0,
            cluster_id: None,
            department: None,
            categories: Vec::new(),
            status: IssueStatus::Open,
            reported_by,
            created_at: Utc::now(),
        }
    }

    pub fn add_vote(&mut self) {
        self.votes = self.votes.saturating_add(1);
    }

    pub fn set_heatmap_score(&mut self, score: f64) {
        self.heatmap_score = clamp_score(score);
    }

    /// Assign to a cluster; archived and converted issues keep their status
    pub fn assign_cluster(&mut self, cluster_id: Uuid) {
        self.cluster_id = Some(cluster_id);
        if self.status == IssueStatus::Open {
            self.status = IssueStatus::Clustered;
        }
    }

    /// Soft delete
    pub fn archive(&mut self) {
        self.status = IssueStatus::Archived;
    }

    pub fn is_active(&self) -> bool {
        self.status != IssueStatus::Archived
    }
}

/// Initiative lifecycle (kanban columns)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InitiativeStatus {
    Define,
    Prioritize,
    #[serde(rename = "In Progress")]
    InProgress,
    Done,
}

impl InitiativeStatus {
    /// Following column, `None` once done
    pub fn next(self) -> Option<Self> {
        match self {
            InitiativeStatus::Define => Some(InitiativeStatus::Prioritize),
            InitiativeStatus::Prioritize => Some(InitiativeStatus::InProgress),
            InitiativeStatus::InProgress => Some(InitiativeStatus::Done),
            InitiativeStatus::Done => None,
        }
    }
}

/// A planned effort addressing one or more issues
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiative {
    pub id: Uuid,
    pub title: String,
    pub problem_statement: String,
    pub goal: String,
    scores: Scores,
    pub status: InitiativeStatus,
    pub owner_id: Uuid,
    pub issue_ids: Vec<Uuid>,
    /// Manual ranking within a status column
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a user supplies when proposing an initiative
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitiativeDraft {
    pub title: String,
    pub problem_statement: String,
    pub goal: String,
    /// Estimated cost, any currency unit
    pub cost: f64,
    /// Estimated gain, same unit as `cost`
    pub gain: f64,
    pub context: BusinessContext,
}

impl InitiativeDraft {
    /// Score the draft text together with the source issue descriptions
    pub fn scores(&self, issues: &[Issue]) -> Scores {
        self.scores_weighted(issues, &DifficultyWeights::default())
    }

    /// `scores` with configured difficulty signal weights
    pub fn scores_weighted(&self, issues: &[Issue], weights: &DifficultyWeights) -> Scores {
        let description = scoring_text(&self.problem_statement, &self.goal, issues);
        Scores::estimate_weighted(&description, &self.context, weights, self.cost, self.gain)
    }
}

/// Problem statement, goal and issue descriptions, one per line
fn scoring_text(problem_statement: &str, goal: &str, issues: &[Issue]) -> String {
    [problem_statement, goal]
        .into_iter()
        .chain(issues.iter().map(|i| i.description.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Initiative {
    /// Create an initiative from source issues, scoring it immediately
    ///
    /// Returns `Error::InvalidInput` when no issue is given or the title is blank.
    pub fn from_issues(
        draft: InitiativeDraft,
        owner_id: Uuid,
        issues: &[Issue],
    ) -> crate::Result<Self> {
        if draft.title.trim().is_empty() {
            return Err(crate::Error::InvalidInput("initiative title is required".into()));
        }
        if issues.is_empty() {
            return Err(crate::Error::InvalidInput(
                "an initiative needs at least one source issue".into(),
            ));
        }

        let scores = draft.scores(issues);
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            title: draft.title,
            problem_statement: draft.problem_statement,
            goal: draft.goal,
            scores,
            status: InitiativeStatus::Define,
            owner_id,
            issue_ids: issues.iter().map(|i| i.id).collect(),
            order_index: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn difficulty(&self) -> f64 {
        self.scores.difficulty()
    }

    pub fn roi(&self) -> f64 {
        self.scores.roi()
    }

    pub fn priority_score(&self) -> f64 {
        self.scores.priority_score()
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    /// Replace difficulty and ROI, recomputing the priority score
    pub fn set_scores(&mut self, difficulty: f64, roi: f64) {
        self.scores = Scores::compute(difficulty, roi);
        self.updated_at = Utc::now();
    }

    /// Re-estimate every score from the current text and the source issues
    ///
    /// Uses the same text as `from_issues`, so an unchanged initiative keeps
    /// its scores.
    pub fn rescore(&mut self, issues: &[Issue], context: &BusinessContext, cost: f64, gain: f64) {
        let description = scoring_text(&self.problem_statement, &self.goal, issues);
        self.scores = Scores::estimate(&description, context, cost, gain);
        self.updated_at = Utc::now();
    }

    /// Owner or admin
    pub fn can_edit(&self, user: &AuthenticatedUser) -> bool {
        user.user_id == self.owner_id || user.has_role(Role::Admin)
    }

    /// Move to the next status column
    pub fn advance_status(&mut self, user: &AuthenticatedUser) -> crate::Result<InitiativeStatus> {
        if !self.can_edit(user) {
            return Err(crate::Error::Forbidden(
                "only the owner or an admin can change an initiative".into(),
            ));
        }
        let next = self.status.next().ok_or_else(|| {
            crate::Error::Conflict(format!("initiative {} is already done", self.id))
        })?;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}

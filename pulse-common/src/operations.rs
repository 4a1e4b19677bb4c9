//! AI operation vocabulary
//!
//! Operation kinds, priorities and the lifecycle state machine shared by the
//! queue, the audit trail and the event stream:
//!
//! ```text
//! queued ──► running ──► completed
//!   │           │    └─► failed
//!   │           └──────► cancelled
//!   └──────────────────► cancelled
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of work delegated to the AI provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Summarize and categorize a single issue
    IssueAnalysis,
    /// Draft an initiative from one or more issues
    InitiativeGeneration,
    /// Group related issues
    Clustering,
    /// Portfolio-level recommendations
    Insights,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::IssueAnalysis => "issue_analysis",
            OperationType::InitiativeGeneration => "initiative_generation",
            OperationType::Clustering => "clustering",
            OperationType::Insights => "insights",
        }
    }

    /// Typical provider round trip for a small input
    pub fn base_duration(&self) -> Duration {
        match self {
            OperationType::IssueAnalysis => Duration::from_secs(5),
            OperationType::InitiativeGeneration => Duration::from_secs(15),
            OperationType::Clustering => Duration::from_secs(30),
            OperationType::Insights => Duration::from_secs(20),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue_analysis" => Ok(OperationType::IssueAnalysis),
            "initiative_generation" => Ok(OperationType::InitiativeGeneration),
            "clustering" => Ok(OperationType::Clustering),
            "insights" => Ok(OperationType::Insights),
            other => Err(crate::Error::InvalidInput(format!("unknown operation type: {}", other))),
        }
    }
}

/// Dequeue priority; ordering follows urgency (`Low < Normal < High`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl OperationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationPriority::Low => "low",
            OperationPriority::Normal => "normal",
            OperationPriority::High => "high",
        }
    }
}

impl fmt::Display for OperationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationPriority {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(OperationPriority::Low),
            "normal" => Ok(OperationPriority::Normal),
            "high" => Ok(OperationPriority::High),
            other => Err(crate::Error::InvalidInput(format!("unknown priority: {}", other))),
        }
    }
}

/// Operation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Queued => "queued",
            OperationState::Running => "running",
            OperationState::Completed => "completed",
            OperationState::Failed => "failed",
            OperationState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }

    /// Forward-only transition table
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(OperationState::Queued),
            "running" => Ok(OperationState::Running),
            "completed" => Ok(OperationState::Completed),
            "failed" => Ok(OperationState::Failed),
            "cancelled" => Ok(OperationState::Cancelled),
            other => Err(crate::Error::InvalidInput(format!("unknown operation state: {}", other))),
        }
    }
}

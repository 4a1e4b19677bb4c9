//! Scoring heuristics for issues and initiatives
//!
//! Pure functions with no I/O. None of them fail or panic: numeric inputs are
//! sanitized first (NaN, infinities and negative values become 0).
//!
//! - `score_roi`: return on investment as a 0-100 percentage
//! - `score_difficulty`: 0-100 effort estimate from free text + business context
//! - `score_priority`: `roi - difficulty / 2`, deliberately NOT clamped

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Lower bound of every bounded score
pub const SCORE_MIN: f64 = 0.0;

/// Upper bound of every bounded score
pub const SCORE_MAX: f64 = 100.0;

/// Lowest value `score_priority` can produce from bounded inputs
pub const PRIORITY_FLOOR: f64 = SCORE_MIN - SCORE_MAX / 2.0;

/// Words of description after which the length signal saturates
const LENGTH_SATURATION_WORDS: f64 = 150.0;

/// Cap applied to each metric count before weighting
const METRIC_COUNT_CAP: f64 = 10.0;

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "integration",
    "migration",
    "migrate",
    "legacy",
    "compliance",
    "security",
    "infrastructure",
    "architecture",
    "regulatory",
    "cross-functional",
    "real-time",
    "scalability",
    "refactor",
    "vendor",
    "multi-region",
    "data model",
];

const SIMPLICITY_KEYWORDS: &[&str] = &[
    "simple", "quick", "minor", "typo", "small", "easy", "cosmetic", "trivial", "wording",
];

const REGULATED_INDUSTRIES: &[&str] = &[
    "healthcare",
    "health",
    "finance",
    "financial",
    "banking",
    "insurance",
    "government",
    "public sector",
    "pharma",
    "pharmaceutical",
    "energy",
    "defense",
];

/// Business context used when estimating difficulty
///
/// Every field is optional; a missing field contributes a neutral weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BusinessContext {
    /// Industry name, e.g. "healthcare"
    pub industry: Option<String>,
    /// Organization size: a label ("startup", "enterprise") or an employee count
    pub organization_size: Option<String>,
    /// Arbitrary numeric metrics (`dependencies`, `stakeholders`, `systems_affected`, ...)
    pub metrics: HashMap<String, f64>,
}

impl BusinessContext {
    /// Build a context from arbitrary JSON, ignoring anything it does not understand
    ///
    /// Never fails: non-object input yields the empty context, non-numeric
    /// metrics are skipped, numeric organization sizes are stringified.
    pub fn from_json_lenient(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let text_field = |names: &[&str]| -> Option<String> {
            names.iter().find_map(|name| match obj.get(*name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
        };

        let metrics = obj
            .get("metrics")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| {
                        let n = match v {
                            Value::Number(n) => n.as_f64(),
                            Value::String(s) => s.trim().parse::<f64>().ok(),
                            _ => None,
                        }?;
                        n.is_finite().then(|| (k.clone(), n))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            industry: text_field(&["industry"]),
            organization_size: text_field(&["organizationSize", "organization_size", "orgSize"]),
            metrics,
        }
    }

    fn metric(&self, name: &str) -> f64 {
        self.metrics
            .get(name)
            .copied()
            .map(sanitize)
            .unwrap_or(0.0)
            .min(METRIC_COUNT_CAP)
    }

    fn is_regulated(&self) -> bool {
        self.industry
            .as_deref()
            .map(|industry| {
                let industry = industry.to_lowercase();
                REGULATED_INDUSTRIES.iter().any(|r| industry.contains(r))
            })
            .unwrap_or(false)
    }

    /// Multiplier applied to the weighted difficulty (1.0 = neutral)
    fn size_multiplier(&self) -> f64 {
        let Some(size) = self.organization_size.as_deref() else {
            return 1.0;
        };
        let size = size.trim().to_lowercase();

        if let Ok(headcount) = size.parse::<f64>() {
            if !headcount.is_finite() || headcount <= 0.0 {
                return 1.0;
            }
            return match headcount {
                h if h < 50.0 => 0.9,
                h if h < 500.0 => 1.0,
                h if h < 5000.0 => 1.1,
                _ => 1.2,
            };
        }

        match size.as_str() {
            "startup" | "small" | "smb" => 0.9,
            "medium" | "mid" | "midsize" | "mid-size" | "mid-market" => 1.0,
            "large" => 1.1,
            "enterprise" | "global" => 1.2,
            _ => 1.0,
        }
    }
}

/// Relative weights of the three difficulty signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyWeights {
    pub length: f64,
    pub keywords: f64,
    pub context: f64,
}

impl Default for DifficultyWeights {
    fn default() -> Self {
        Self {
            length: 0.3,
            keywords: 0.4,
            context: 0.3,
        }
    }
}

impl DifficultyWeights {
    /// Sanitized weights normalized to sum to 1.0; defaults if unusable
    fn normalized(&self) -> Self {
        let length = sanitize(self.length);
        let keywords = sanitize(self.keywords);
        let context = sanitize(self.context);
        let total = length + keywords + context;

        if !total.is_finite() || total <= 0.0 {
            return Self::default();
        }

        Self {
            length: length / total,
            keywords: keywords / total,
            context: context / total,
        }
    }
}

/// Priority band thresholds (`critical > high > medium > low`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            critical: 80.0,
            high: 60.0,
            medium: 40.0,
            low: 20.0,
        }
    }
}

/// Band a priority score falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityBand {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl PriorityThresholds {
    pub fn classify(&self, priority_score: f64) -> PriorityBand {
        if priority_score.is_nan() {
            return PriorityBand::Minimal;
        }
        match priority_score {
            s if s >= self.critical => PriorityBand::Critical,
            s if s >= self.high => PriorityBand::High,
            s if s >= self.medium => PriorityBand::Medium,
            s if s >= self.low => PriorityBand::Low,
            _ => PriorityBand::Minimal,
        }
    }
}

/// Difficulty, ROI and priority computed together
///
/// There is no way to build a `Scores` with a priority that disagrees with
/// its difficulty and ROI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    difficulty: f64,
    roi: f64,
    priority_score: f64,
}

impl Scores {
    /// Clamp difficulty and ROI into [0, 100] and derive the priority score
    pub fn compute(difficulty: f64, roi: f64) -> Self {
        let difficulty = clamp_score(difficulty);
        let roi = clamp_score(roi);
        Self {
            difficulty,
            roi,
            priority_score: score_priority(difficulty, roi),
        }
    }

    /// Score an initiative draft from its description, context and cost/gain estimate
    pub fn estimate(text: &str, context: &BusinessContext, cost: f64, gain: f64) -> Self {
        Self::estimate_weighted(text, context, &DifficultyWeights::default(), cost, gain)
    }

    /// `estimate` with configured difficulty signal weights
    pub fn estimate_weighted(
        text: &str,
        context: &BusinessContext,
        weights: &DifficultyWeights,
        cost: f64,
        gain: f64,
    ) -> Self {
        Self::compute(
            score_difficulty_weighted(text, context, weights),
            score_roi(cost, gain),
        )
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn roi(&self) -> f64 {
        self.roi
    }

    pub fn priority_score(&self) -> f64 {
        self.priority_score
    }
}

/// Replace NaN, infinities and negative numbers with 0
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Sanitize and clamp into [0, 100]
pub fn clamp_score(value: f64) -> f64 {
    sanitize(value).min(SCORE_MAX)
}

/// Return on investment as a percentage clamped to [0, 100]
///
/// A non-positive cost is treated as maximal return (100).
pub fn score_roi(cost: f64, gain: f64) -> f64 {
    let cost = sanitize(cost);
    let gain = sanitize(gain);

    if cost <= 0.0 {
        return SCORE_MAX;
    }

    let percentage = (gain - cost) / cost * 100.0;
    if percentage.is_nan() {
        return SCORE_MIN;
    }
    percentage.clamp(SCORE_MIN, SCORE_MAX)
}

/// Difficulty estimate in [0, 100] using the default signal weights
pub fn score_difficulty(text: &str, context: &BusinessContext) -> f64 {
    score_difficulty_weighted(text, context, &DifficultyWeights::default())
}

/// Difficulty estimate in [0, 100] with explicit signal weights
///
/// Three signals, each normalized to [0, 1]:
/// - length: word count, saturating at 150 words
/// - keywords: complexity terms push up, simplicity terms pull down (0.3 when neither appears)
/// - context: regulated industry and dependency/stakeholder/system counts (0.3 when empty)
///
/// The weighted sum is scaled by the organization-size multiplier, then
/// rounded and clamped.
pub fn score_difficulty_weighted(
    text: &str,
    context: &BusinessContext,
    weights: &DifficultyWeights,
) -> f64 {
    let weights = weights.normalized();
    let lowered = text.trim().to_lowercase();

    let words = lowered.split_whitespace().count() as f64;
    let length_signal = (words / LENGTH_SATURATION_WORDS).min(1.0);

    let complexity_hits = COMPLEXITY_KEYWORDS
        .iter()
        .filter(|k| lowered.contains(*k))
        .count() as f64;
    let simplicity_hits = SIMPLICITY_KEYWORDS
        .iter()
        .filter(|k| contains_word(&lowered, k))
        .count() as f64;
    let keyword_signal = (0.3 + 0.15 * complexity_hits - 0.12 * simplicity_hits).clamp(0.0, 1.0);

    let mut context_signal = 0.3;
    if context.is_regulated() {
        context_signal += 0.2;
    }
    context_signal += 0.05 * context.metric("dependencies");
    context_signal += 0.03 * context.metric("stakeholders");
    context_signal += 0.06 * context.metric("systems_affected");
    let context_signal = context_signal.clamp(0.0, 1.0);

    let weighted = weights.length * length_signal
        + weights.keywords * keyword_signal
        + weights.context * context_signal;

    let difficulty = (weighted * SCORE_MAX * context.size_multiplier()).round();
    if difficulty.is_nan() {
        return SCORE_MIN;
    }
    difficulty.clamp(SCORE_MIN, SCORE_MAX)
}

/// Priority score: `roi - difficulty / 2`
///
/// Not clamped: bounded inputs give [-50, 100], and callers that pass
/// out-of-range ROI get an out-of-range priority back.
pub fn score_priority(difficulty: f64, roi: f64) -> f64 {
    sanitize(roi) - sanitize(difficulty) / 2.0
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .any(|token| token == word)
}

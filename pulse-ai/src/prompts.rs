//! Prompt construction per operation type

use crate::provider::Prompt;
use pulse_common::operations::OperationType;
use pulse_common::scoring::{BusinessContext, DifficultyWeights, Scores};
use serde_json::Value;

const ISSUE_ANALYSIS_SYSTEM: &str = "You analyze business issues reported by employees. \
Summarize the issue in two sentences, assign one category and list the departments affected. \
Answer in JSON with keys summary, category, departments.";

const INITIATIVE_SYSTEM: &str = "You turn clusters of related issues into improvement initiatives. \
Propose a title, a problem statement and a measurable goal. \
Answer in JSON with keys title, problemStatement, goal.";

const CLUSTERING_SYSTEM: &str = "You group related business issues. \
Return clusters of issue ids that describe the same underlying problem, each with a short label. \
Answer in JSON as a list of objects with keys label and issueIds.";

const INSIGHTS_SYSTEM: &str = "You review an organization's open issues and initiatives. \
Identify the three most important trends and recommend one action for each. \
Answer in JSON as a list of objects with keys trend and recommendation.";

/// Build the prompt for one operation
///
/// Initiative generation carries a heuristic difficulty estimate so the model
/// can calibrate the scope of its proposal.
pub fn build_prompt(
    operation_type: OperationType,
    input: &Value,
    context: Option<&Value>,
    weights: &DifficultyWeights,
) -> Prompt {
    let business_context = context
        .map(BusinessContext::from_json_lenient)
        .unwrap_or_default();

    let system = match operation_type {
        OperationType::IssueAnalysis => ISSUE_ANALYSIS_SYSTEM,
        OperationType::InitiativeGeneration => INITIATIVE_SYSTEM,
        OperationType::Clustering => CLUSTERING_SYSTEM,
        OperationType::Insights => INSIGHTS_SYSTEM,
    };

    let mut user = String::new();
    if let Some(context) = context {
        user.push_str("Business context:\n");
        user.push_str(&render(context));
        user.push_str("\n\n");
    }

    if operation_type == OperationType::InitiativeGeneration {
        let text = input_text(input);
        let scores = Scores::estimate_weighted(&text, &business_context, weights, 0.0, 0.0);
        user.push_str(&format!(
            "Estimated difficulty (0-100): {:.0}\n\n",
            scores.difficulty()
        ));
    }

    user.push_str("Input:\n");
    user.push_str(&render(input));

    Prompt {
        system: system.to_string(),
        user,
    }
}

/// Free text of an input payload: plain strings as-is, otherwise every string leaf
fn input_text(input: &Value) -> String {
    let mut parts = Vec::new();
    collect_strings(input, &mut parts);
    parts.join(" ")
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

//! Named business rules checked after the schema passes
//!
//! Rules are cross-field constraints a schema cannot express, e.g.
//! "critical > high > medium > low".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cross-field constraint over an object value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BusinessRule {
    /// Each field strictly greater than the next
    DescendingOrder { fields: Vec<String> },
    /// Adjacent fields differ by at least `spread`
    MinimumSpread { fields: Vec<String>, spread: f64 },
    /// Fields add up to `total` within `tolerance`
    SumEquals {
        fields: Vec<String>,
        total: f64,
        tolerance: f64,
    },
}

impl BusinessRule {
    pub fn descending_order(fields: &[&str]) -> Self {
        BusinessRule::DescendingOrder {
            fields: owned(fields),
        }
    }

    pub fn minimum_spread(fields: &[&str], spread: f64) -> Self {
        BusinessRule::MinimumSpread {
            fields: owned(fields),
            spread,
        }
    }

    pub fn sum_equals(fields: &[&str], total: f64, tolerance: f64) -> Self {
        BusinessRule::SumEquals {
            fields: owned(fields),
            total,
            tolerance,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BusinessRule::DescendingOrder { .. } => "descending_order",
            BusinessRule::MinimumSpread { .. } => "minimum_spread",
            BusinessRule::SumEquals { .. } => "sum_equals",
        }
    }

    /// Human-readable statement of the rule
    pub fn describe(&self) -> String {
        match self {
            BusinessRule::DescendingOrder { fields } => fields.join(" > "),
            BusinessRule::MinimumSpread { fields, spread } => {
                format!("minimum {}-point spread between {}", spread, fields.join(", "))
            }
            BusinessRule::SumEquals {
                fields,
                total,
                tolerance,
            } => format!("{} sum to {} ± {}", fields.join(" + "), total, tolerance),
        }
    }

    /// Violations of this rule; empty when satisfied
    ///
    /// Fields missing from `value` or not numeric are skipped, the schema
    /// already reports them.
    pub fn check(&self, path: &str, value: &Value) -> Vec<String> {
        let violation = |detail: String| {
            format!(
                "{}: business rule '{}' violated: {}",
                path,
                self.name(),
                detail
            )
        };

        match self {
            BusinessRule::DescendingOrder { fields } => adjacent(value, fields)
                .filter(|((_, a), (_, b))| a <= b)
                .map(|((na, a), (nb, b))| {
                    violation(format!("{} ({}) must be greater than {} ({})", na, a, nb, b))
                })
                .collect(),
            BusinessRule::MinimumSpread { fields, spread } => adjacent(value, fields)
                .filter(|((_, a), (_, b))| (a - b).abs() < *spread)
                .map(|((na, a), (nb, b))| {
                    violation(format!(
                        "{} ({}) and {} ({}) must be at least {} apart",
                        na, a, nb, b, spread
                    ))
                })
                .collect(),
            BusinessRule::SumEquals {
                fields,
                total,
                tolerance,
            } => {
                let values: Vec<f64> = fields
                    .iter()
                    .filter_map(|f| number_field(value, f))
                    .collect();
                if values.len() != fields.len() {
                    return Vec::new();
                }
                let sum: f64 = values.iter().sum();
                if (sum - total).abs() > *tolerance {
                    vec![violation(format!(
                        "{} sum to {:.3}, expected {} ± {}",
                        fields.join(" + "),
                        sum,
                        total,
                        tolerance
                    ))]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn number_field(value: &Value, field: &str) -> Option<f64> {
    value.get(field).and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Consecutive pairs of present numeric fields, in declared order
fn adjacent<'a>(
    value: &'a Value,
    fields: &'a [String],
) -> impl Iterator<Item = ((&'a str, f64), (&'a str, f64))> + 'a {
    fields.windows(2).filter_map(move |pair| {
        let a = number_field(value, &pair[0])?;
        let b = number_field(value, &pair[1])?;
        Some(((pair[0].as_str(), a), (pair[1].as_str(), b)))
    })
}

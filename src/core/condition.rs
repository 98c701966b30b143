//! Structured rule conditions.
//!
//! A condition is a small expression tree over a metrics snapshot:
//! boolean combinators at the top, comparisons at the leaves, and operands
//! that read a scalar counter, one entry of a history, or an aggregate over
//! the trailing window of a history.
//!
//! Conditions are validated against a [`MetricsSchema`] when a curriculum
//! is loaded and evaluated by a total interpreter. Evaluation never treats a
//! broken condition as a plain non-match: reading an unknown field or an
//! empty history is an error.
//!
//! ```json
//! {"op": "all", "of": [
//!   {"op": "compare", "left": {"kind": "last", "field": "finished_trials"},
//!    "cmp": ">=", "right": {"kind": "const", "value": 200}},
//!   {"op": "compare", "left": {"kind": "last", "field": "foraging_efficiency"},
//!    "cmp": ">=", "right": {"kind": "const", "value": 0.6}}
//! ]}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::metrics::{FieldKind, Metrics, MetricsSchema};
use crate::error::{AutoTrainError, Result};

/// Boolean predicate over a metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Always true.
    Always,
    /// True when every sub-condition is true (short-circuits).
    All { of: Vec<Condition> },
    /// True when any sub-condition is true (short-circuits).
    Any { of: Vec<Condition> },
    /// Negation.
    Not { of: Box<Condition> },
    /// Numeric comparison.
    Compare {
        left: Operand,
        cmp: Comparator,
        right: Operand,
    },
}

/// A numeric value read from the snapshot or given literally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    /// Literal number.
    Const { value: f64 },
    /// Scalar counter (`session_total`, `session_at_current_stage`).
    Field { field: String },
    /// Most recent history entry (`x[-1]`).
    Last { field: String },
    /// History entry by index; negative indices count from the end.
    At { field: String, index: i64 },
    /// Aggregate over the trailing `window` entries (`agg(x[-window:])`).
    ///
    /// A window larger than the history uses every available entry.
    Window {
        agg: Aggregate,
        field: String,
        window: usize,
    },
    /// Number of entries in a history.
    Count { field: String },
}

/// Aggregate applied to a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Mean,
    Min,
    Max,
    Sum,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparator {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

impl Aggregate {
    fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
        }
    }

    fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Sum => values.iter().sum(),
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Scalar counter operand.
pub fn field(name: &str) -> Operand {
    Operand::Field {
        field: name.to_string(),
    }
}

/// Most recent entry of a history.
pub fn last(name: &str) -> Operand {
    Operand::Last {
        field: name.to_string(),
    }
}

/// Mean of the trailing `window` entries of a history.
pub fn mean(name: &str, window: usize) -> Operand {
    Operand::Window {
        agg: Aggregate::Mean,
        field: name.to_string(),
        window,
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Const { value }
    }
}

impl Operand {
    fn compare(self, cmp: Comparator, right: impl Into<Operand>) -> Condition {
        Condition::Compare {
            left: self,
            cmp,
            right: right.into(),
        }
    }

    pub fn gt(self, right: impl Into<Operand>) -> Condition {
        self.compare(Comparator::Gt, right)
    }

    pub fn ge(self, right: impl Into<Operand>) -> Condition {
        self.compare(Comparator::Ge, right)
    }

    pub fn lt(self, right: impl Into<Operand>) -> Condition {
        self.compare(Comparator::Lt, right)
    }

    pub fn le(self, right: impl Into<Operand>) -> Condition {
        self.compare(Comparator::Le, right)
    }

    /// Field name the operand reads, if any.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Const { .. } => None,
            Self::Field { field }
            | Self::Last { field }
            | Self::At { field, .. }
            | Self::Window { field, .. }
            | Self::Count { field } => Some(field),
        }
    }
}

impl Condition {
    /// Conjunction.
    pub fn all(of: impl IntoIterator<Item = Condition>) -> Self {
        Self::All {
            of: of.into_iter().collect(),
        }
    }

    /// Disjunction.
    pub fn any(of: impl IntoIterator<Item = Condition>) -> Self {
        Self::Any {
            of: of.into_iter().collect(),
        }
    }

    /// Negation.
    pub fn negate(self) -> Self {
        Self::Not { of: Box::new(self) }
    }
}

// =============================================================================
// Validation
// =============================================================================

impl Operand {
    fn validate(&self, schema: MetricsSchema) -> std::result::Result<(), String> {
        match self {
            Self::Const { value } => {
                if value.is_finite() {
                    Ok(())
                } else {
                    Err(format!("constant {value} is not finite"))
                }
            }
            Self::Field { field } => match schema.field_kind(field) {
                Some(FieldKind::Scalar) => Ok(()),
                Some(FieldKind::History) => Err(format!(
                    "'{field}' is a history; read it with last, at, window or count"
                )),
                None => Err(format!("{schema} metrics have no field '{field}'")),
            },
            Self::Last { field } | Self::At { field, .. } | Self::Count { field } => {
                expect_history(schema, field)
            }
            Self::Window { field, window, .. } => {
                expect_history(schema, field)?;
                if *window == 0 {
                    Err(format!("window over '{field}' must be at least 1"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn expect_history(schema: MetricsSchema, field: &str) -> std::result::Result<(), String> {
    match schema.field_kind(field) {
        Some(FieldKind::History) => Ok(()),
        Some(FieldKind::Scalar) => Err(format!("'{field}' is a scalar, not a history")),
        None => Err(format!("{schema} metrics have no field '{field}'")),
    }
}

impl Condition {
    /// Check that every field the condition reads exists in `schema` with
    /// the right kind.
    pub fn validate(&self, schema: MetricsSchema) -> std::result::Result<(), String> {
        match self {
            Self::Always => Ok(()),
            Self::All { of } | Self::Any { of } => {
                of.iter().try_for_each(|c| c.validate(schema))
            }
            Self::Not { of } => of.validate(schema),
            Self::Compare { left, right, .. } => {
                left.validate(schema)?;
                right.validate(schema)
            }
        }
    }

    /// Window sizes used anywhere in the condition.
    pub fn windows(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_windows(&mut out);
        out
    }

    fn collect_windows(&self, out: &mut Vec<usize>) {
        match self {
            Self::Always => {}
            Self::All { of } | Self::Any { of } => {
                of.iter().for_each(|c| c.collect_windows(out));
            }
            Self::Not { of } => of.collect_windows(out),
            Self::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Window { window, .. } = operand {
                        out.push(*window);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn history<'m>(metrics: &'m dyn Metrics, field: &str) -> Result<&'m [f64]> {
    let values = metrics.history(field).ok_or_else(|| {
        AutoTrainError::condition(format!(
            "{} metrics have no history '{field}'",
            metrics.schema()
        ))
    })?;
    if values.is_empty() {
        return Err(AutoTrainError::condition(format!(
            "history '{field}' is empty"
        )));
    }
    Ok(values)
}

impl Operand {
    /// Evaluate the operand to a number.
    pub fn evaluate(&self, metrics: &dyn Metrics) -> Result<f64> {
        match self {
            Self::Const { value } => Ok(*value),
            Self::Field { field } => metrics.scalar(field).ok_or_else(|| {
                AutoTrainError::condition(format!(
                    "{} metrics have no scalar '{field}'",
                    metrics.schema()
                ))
            }),
            Self::Last { field } => {
                let values = history(metrics, field)?;
                Ok(values[values.len() - 1])
            }
            Self::At { field, index } => {
                let values = history(metrics, field)?;
                let len = values.len() as i64;
                let resolved = if *index < 0 { len + index } else { *index };
                if resolved < 0 || resolved >= len {
                    return Err(AutoTrainError::condition(format!(
                        "index {index} out of range for '{field}' with {len} entries"
                    )));
                }
                Ok(values[resolved as usize])
            }
            Self::Window { agg, field, window } => {
                let values = history(metrics, field)?;
                let start = values.len().saturating_sub(*window);
                Ok(agg.apply(&values[start..]))
            }
            Self::Count { field } => metrics
                .history(field)
                .map(|values| values.len() as f64)
                .ok_or_else(|| {
                    AutoTrainError::condition(format!(
                        "{} metrics have no history '{field}'",
                        metrics.schema()
                    ))
                }),
        }
    }
}

impl Condition {
    /// Evaluate the condition against a snapshot.
    pub fn evaluate(&self, metrics: &dyn Metrics) -> Result<bool> {
        match self {
            Self::Always => Ok(true),
            Self::All { of } => {
                for condition in of {
                    if !condition.evaluate(metrics)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any { of } => {
                for condition in of {
                    if condition.evaluate(metrics)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not { of } => Ok(!of.evaluate(metrics)?),
            Self::Compare { left, cmp, right } => {
                Ok(cmp.apply(left.evaluate(metrics)?, right.evaluate(metrics)?))
            }
        }
    }
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const { value } => write!(f, "{value}"),
            Self::Field { field } => write!(f, "{field}"),
            Self::Last { field } => write!(f, "{field}[-1]"),
            Self::At { field, index } => write!(f, "{field}[{index}]"),
            Self::Window { agg, field, window } => {
                write!(f, "{}({field}[-{window}:])", agg.name())
            }
            Self::Count { field } => write!(f, "len({field})"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("true"),
            Self::All { of } | Self::Any { of } => {
                let joiner = if matches!(self, Self::All { .. }) {
                    " and "
                } else {
                    " or "
                };
                if of.is_empty() {
                    return f.write_str(if joiner == " and " { "true" } else { "false" });
                }
                let parts: Vec<String> = of
                    .iter()
                    .map(|c| match c {
                        Self::All { .. } | Self::Any { .. } => format!("({c})"),
                        _ => c.to_string(),
                    })
                    .collect();
                f.write_str(&parts.join(joiner))
            }
            Self::Not { of } => write!(f, "not ({of})"),
            Self::Compare { left, cmp, right } => {
                write!(f, "{left} {} {right}", cmp.symbol())
            }
        }
    }
}

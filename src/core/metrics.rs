//! Metrics snapshots consumed by rule conditions.
//!
//! Every task exposes the two common counters (`session_total` and
//! `session_at_current_stage`) plus its own performance *histories*: one
//! entry per session so far, oldest first, so index -1 is the session being
//! evaluated. Histories within one snapshot are always the same length.
//!
//! The concrete record type is chosen by [`MetricsSchema`], which a
//! curriculum declares. Conditions are validated against the schema when a
//! curriculum is loaded and the engine refuses snapshots of another schema.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AutoTrainError, Result};

/// Lifetime session count field.
pub const SESSION_TOTAL: &str = "session_total";

/// Consecutive sessions at the evaluated stage.
pub const SESSION_AT_CURRENT_STAGE: &str = "session_at_current_stage";

/// Kind of a named metrics field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single number (the common counters).
    Scalar,
    /// A per-session history.
    History,
}

/// Identity of a task's metrics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSchema {
    DynamicForaging,
    DummyTask,
}

impl MetricsSchema {
    /// Task-specific history fields, in declaration order.
    pub fn history_fields(&self) -> &'static [&'static str] {
        match self {
            Self::DynamicForaging => DynamicForagingMetrics::HISTORY_FIELDS,
            Self::DummyTask => DummyTaskMetrics::HISTORY_FIELDS,
        }
    }

    /// Older column names the behavior table may still use for a field.
    pub fn aliases(&self, field: &str) -> &'static [&'static str] {
        match (self, field) {
            (Self::DynamicForaging, "foraging_efficiency") => &["foraging_eff"],
            _ => &[],
        }
    }

    /// Classify a field name, or `None` if the schema has no such field.
    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        if field == SESSION_TOTAL || field == SESSION_AT_CURRENT_STAGE {
            Some(FieldKind::Scalar)
        } else if self.history_fields().contains(&field) {
            Some(FieldKind::History)
        } else {
            None
        }
    }

    /// Build the concrete snapshot for this schema.
    pub fn build(
        &self,
        histories: BTreeMap<String, Vec<f64>>,
        session_total: u32,
        session_at_current_stage: u32,
    ) -> Result<MetricsSnapshot> {
        match self {
            Self::DynamicForaging => DynamicForagingMetrics::from_histories(
                histories,
                session_total,
                session_at_current_stage,
            )
            .map(MetricsSnapshot::DynamicForaging),
            Self::DummyTask => {
                DummyTaskMetrics::from_histories(histories, session_total, session_at_current_stage)
                    .map(MetricsSnapshot::DummyTask)
            }
        }
    }

    /// Canonical tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DynamicForaging => "dynamic_foraging",
            Self::DummyTask => "dummy_task",
        }
    }
}

impl fmt::Display for MetricsSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to a metrics snapshot.
///
/// This is the capability set conditions are evaluated against.
pub trait Metrics: fmt::Debug {
    /// Schema of the concrete record.
    fn schema(&self) -> MetricsSchema;

    /// Lifetime session count.
    fn session_total(&self) -> u32;

    /// Consecutive sessions at the evaluated stage, including this one.
    fn session_at_current_stage(&self) -> u32;

    /// History of a task-specific field, oldest first.
    fn history(&self, field: &str) -> Option<&[f64]>;

    /// Value of a scalar field.
    fn scalar(&self, field: &str) -> Option<f64> {
        match field {
            SESSION_TOTAL => Some(f64::from(self.session_total())),
            SESSION_AT_CURRENT_STAGE => Some(f64::from(self.session_at_current_stage())),
            _ => None,
        }
    }
}

/// A concrete per-task metrics record.
pub trait TaskMetrics: Metrics + Sized {
    /// Schema this record implements.
    const SCHEMA: MetricsSchema;

    /// History fields this record requires.
    const HISTORY_FIELDS: &'static [&'static str];

    /// Build the record from named histories.
    fn from_histories(
        histories: BTreeMap<String, Vec<f64>>,
        session_total: u32,
        session_at_current_stage: u32,
    ) -> Result<Self>;
}

/// Pull the required histories out of a map and check they are aligned.
fn take_aligned<const N: usize>(
    schema: MetricsSchema,
    fields: &[&str],
    mut histories: BTreeMap<String, Vec<f64>>,
) -> Result<[Vec<f64>; N]> {
    let mut taken: Vec<Vec<f64>> = Vec::with_capacity(N);
    for field in fields {
        let history = histories.remove(*field).ok_or_else(|| {
            AutoTrainError::metrics_schema(format!("{schema} metrics require field '{field}'"))
        })?;
        taken.push(history);
    }

    if let Some(first) = taken.first() {
        let len = first.len();
        if let Some((idx, other)) = taken.iter().enumerate().find(|(_, h)| h.len() != len) {
            return Err(AutoTrainError::metrics_schema(format!(
                "{schema} histories are not aligned: '{}' has {} entries, '{}' has {}",
                fields[0],
                len,
                fields[idx],
                other.len()
            )));
        }
    }

    taken
        .try_into()
        .map_err(|_| AutoTrainError::metrics_schema(format!("{schema} field count mismatch")))
}

/// Metrics for the dynamic foraging task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicForagingMetrics {
    pub session_total: u32,
    pub session_at_current_stage: u32,
    /// Foraging efficiency per session.
    pub foraging_efficiency: Vec<f64>,
    /// Finished (non-ignored) trials per session.
    pub finished_trials: Vec<f64>,
}

impl Metrics for DynamicForagingMetrics {
    fn schema(&self) -> MetricsSchema {
        Self::SCHEMA
    }

    fn session_total(&self) -> u32 {
        self.session_total
    }

    fn session_at_current_stage(&self) -> u32 {
        self.session_at_current_stage
    }

    fn history(&self, field: &str) -> Option<&[f64]> {
        match field {
            "foraging_efficiency" => Some(&self.foraging_efficiency),
            "finished_trials" => Some(&self.finished_trials),
            _ => None,
        }
    }
}

impl TaskMetrics for DynamicForagingMetrics {
    const SCHEMA: MetricsSchema = MetricsSchema::DynamicForaging;
    const HISTORY_FIELDS: &'static [&'static str] = &["foraging_efficiency", "finished_trials"];

    fn from_histories(
        histories: BTreeMap<String, Vec<f64>>,
        session_total: u32,
        session_at_current_stage: u32,
    ) -> Result<Self> {
        let [foraging_efficiency, finished_trials] =
            take_aligned::<2>(Self::SCHEMA, Self::HISTORY_FIELDS, histories)?;
        Ok(Self {
            session_total,
            session_at_current_stage,
            foraging_efficiency,
            finished_trials,
        })
    }
}

/// Metrics for the dummy demonstration task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DummyTaskMetrics {
    pub session_total: u32,
    pub session_at_current_stage: u32,
    pub dummy_metric_float: Vec<f64>,
    pub dummy_metric_int: Vec<f64>,
}

impl Metrics for DummyTaskMetrics {
    fn schema(&self) -> MetricsSchema {
        Self::SCHEMA
    }

    fn session_total(&self) -> u32 {
        self.session_total
    }

    fn session_at_current_stage(&self) -> u32 {
        self.session_at_current_stage
    }

    fn history(&self, field: &str) -> Option<&[f64]> {
        match field {
            "dummy_metric_float" => Some(&self.dummy_metric_float),
            "dummy_metric_int" => Some(&self.dummy_metric_int),
            _ => None,
        }
    }
}

impl TaskMetrics for DummyTaskMetrics {
    const SCHEMA: MetricsSchema = MetricsSchema::DummyTask;
    const HISTORY_FIELDS: &'static [&'static str] = &["dummy_metric_float", "dummy_metric_int"];

    fn from_histories(
        histories: BTreeMap<String, Vec<f64>>,
        session_total: u32,
        session_at_current_stage: u32,
    ) -> Result<Self> {
        let [dummy_metric_float, dummy_metric_int] =
            take_aligned::<2>(Self::SCHEMA, Self::HISTORY_FIELDS, histories)?;
        Ok(Self {
            session_total,
            session_at_current_stage,
            dummy_metric_float,
            dummy_metric_int,
        })
    }
}

/// A snapshot of whichever concrete record the curriculum expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum MetricsSnapshot {
    DynamicForaging(DynamicForagingMetrics),
    DummyTask(DummyTaskMetrics),
}

impl MetricsSnapshot {
    fn inner(&self) -> &dyn Metrics {
        match self {
            Self::DynamicForaging(m) => m,
            Self::DummyTask(m) => m,
        }
    }

    /// The most recent value of every history field.
    pub fn latest(&self) -> BTreeMap<String, f64> {
        self.schema()
            .history_fields()
            .iter()
            .filter_map(|field| {
                self.history(field)
                    .and_then(|h| h.last())
                    .map(|v| (field.to_string(), *v))
            })
            .collect()
    }
}

impl Metrics for MetricsSnapshot {
    fn schema(&self) -> MetricsSchema {
        self.inner().schema()
    }

    fn session_total(&self) -> u32 {
        self.inner().session_total()
    }

    fn session_at_current_stage(&self) -> u32 {
        self.inner().session_at_current_stage()
    }

    fn history(&self, field: &str) -> Option<&[f64]> {
        self.inner().history(field)
    }
}

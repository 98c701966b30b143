//! Behavior-table rows and ledger rows.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::{CurriculumKey, Decision, MetricsSnapshot, TrainingStage};

/// Keys of a behavior row that are not performance columns.
const RESERVED_KEYS: &[&str] = &[
    "subject_id",
    "session_date",
    "session",
    "curriculum_name",
    "curriculum_version",
    "curriculum_schema_version",
    "current_stage_actual",
];

/// One completed session from the behavior source.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorRecord {
    pub subject_id: String,
    pub session_date: NaiveDate,
    pub session: u32,
    /// Curriculum the rig reported for this session, if it reported one.
    pub curriculum: Option<CurriculumKey>,
    /// Raw stage string the rig reported, if any.
    pub current_stage_actual: Option<String>,
    /// Numeric performance columns.
    pub columns: BTreeMap<String, f64>,
}

impl BehaviorRecord {
    /// Create a record with no curriculum, no actual stage and no columns.
    pub fn new(subject_id: impl Into<String>, session: u32, session_date: NaiveDate) -> Self {
        Self {
            subject_id: subject_id.into(),
            session_date,
            session,
            curriculum: None,
            current_stage_actual: None,
            columns: BTreeMap::new(),
        }
    }

    pub fn with_curriculum(mut self, key: CurriculumKey) -> Self {
        self.curriculum = Some(key);
        self
    }

    pub fn with_actual_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage_actual = Some(stage.into());
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, value: f64) -> Self {
        self.columns.insert(name.into(), value);
        self
    }

    /// The reported stage, if it names a known stage.
    pub fn actual_stage(&self) -> Option<TrainingStage> {
        self.current_stage_actual.as_deref()?.parse().ok()
    }

    /// Parse one JSON object from the source.
    pub fn from_json(row: &Map<String, Value>) -> std::result::Result<Self, String> {
        let subject_id = match row.get("subject_id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err("missing subject_id".to_string()),
        };

        let session = row
            .get("session")
            .and_then(parse_session)
            .ok_or_else(|| format!("subject {subject_id}: missing or invalid session number"))?;

        let session_date = row
            .get("session_date")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .ok_or_else(|| {
                format!("subject {subject_id} session {session}: missing or invalid session_date")
            })?;

        let curriculum = match (
            row.get("curriculum_name").and_then(text),
            row.get("curriculum_version").and_then(text),
            row.get("curriculum_schema_version").and_then(text),
        ) {
            (Some(name), Some(version), Some(schema)) => {
                Some(CurriculumKey::new(name, version, schema))
            }
            _ => None,
        };

        let current_stage_actual = row
            .get("current_stage_actual")
            .and_then(Value::as_str)
            .map(str::to_string);

        let columns = row
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
            .collect();

        Ok(Self {
            subject_id,
            session_date,
            session,
            curriculum,
            current_stage_actual,
            columns,
        })
    }
}

/// A positive integral session number.
fn parse_session(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok().filter(|n| *n > 0);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f >= 1.0 && f <= f64::from(u32::MAX) {
        Some(f as u32)
    } else {
        None
    }
}

/// A string or a number rendered as a string.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The full behavior table, sorted by `(subject_id, session)`.
#[derive(Debug, Clone, Default)]
pub struct BehaviorTable {
    records: Vec<BehaviorRecord>,
    simulation: bool,
}

impl BehaviorTable {
    /// Build a table from parsed records.
    ///
    /// `simulation` is true when the source carries no actual-stage column.
    /// Duplicate `(subject_id, session)` rows keep the first occurrence.
    pub fn new(mut records: Vec<BehaviorRecord>, simulation: bool) -> Self {
        records.sort_by(|a, b| {
            a.subject_id
                .cmp(&b.subject_id)
                .then(a.session.cmp(&b.session))
        });

        let mut seen = HashSet::new();
        records.retain(|r| {
            let fresh = seen.insert((r.subject_id.clone(), r.session));
            if !fresh {
                warn!(
                    subject_id = %r.subject_id,
                    session = r.session,
                    "duplicate behavior row dropped"
                );
            }
            fresh
        });

        Self {
            records,
            simulation,
        }
    }

    /// Build a table from raw JSON objects, dropping malformed rows.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Map<String, Value>>) -> Self {
        let mut simulation = true;
        let mut records = Vec::new();

        for row in rows {
            if row.contains_key("current_stage_actual") {
                simulation = false;
            }
            match BehaviorRecord::from_json(row) {
                Ok(record) => records.push(record),
                Err(reason) => warn!(%reason, "behavior row dropped"),
            }
        }

        Self::new(records, simulation)
    }

    /// Parse a JSON Lines document, one object per line.
    pub fn from_jsonl(text: &str) -> Self {
        let rows: Vec<Map<String, Value>> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(idx, line)| match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(map)) => Some(map),
                Ok(_) => {
                    warn!(line = idx + 1, "behavior line is not a JSON object; skipped");
                    None
                }
                Err(e) => {
                    warn!(line = idx + 1, error = %e, "behavior line is not valid JSON; skipped");
                    None
                }
            })
            .collect();
        Self::from_rows(&rows)
    }

    /// Whether the table has no actual-stage information at all.
    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    pub fn records(&self) -> &[BehaviorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up one subject-session.
    pub fn get(&self, subject_id: &str, session: u32) -> Option<&BehaviorRecord> {
        self.records
            .binary_search_by(|r| {
                r.subject_id
                    .as_str()
                    .cmp(subject_id)
                    .then(r.session.cmp(&session))
            })
            .ok()
            .map(|idx| &self.records[idx])
    }

    /// All sessions of a subject up to and including `session`, in order.
    pub fn history(&self, subject_id: &str, session: u32) -> &[BehaviorRecord] {
        let start = self
            .records
            .partition_point(|r| r.subject_id.as_str() < subject_id);
        let end = self.records.partition_point(|r| {
            (r.subject_id.as_str(), r.session) <= (subject_id, session)
        });
        &self.records[start..end.max(start)]
    }
}

/// One evaluated subject-session. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub subject_id: String,
    pub session_date: NaiveDate,
    pub session: u32,
    #[serde(flatten)]
    pub curriculum: CurriculumKey,
    pub session_at_current_stage: u32,
    pub current_stage_suggested: TrainingStage,
    pub current_stage_actual: TrainingStage,
    pub if_closed_loop: bool,
    pub if_overridden_by_trainer: bool,
    /// Latest value of each task metric used for the decision.
    pub task_metrics: BTreeMap<String, f64>,
    /// Full snapshot the rules were evaluated against.
    pub metrics: MetricsSnapshot,
    pub decision: Decision,
    pub next_stage_suggested: TrainingStage,
}

impl LedgerRecord {
    /// Status line: `STAY at X` or `PROGRESS X --> Y`.
    pub fn status_line(&self) -> String {
        match self.decision {
            Decision::Stay => format!("STAY at {}", self.current_stage_actual),
            decision => format!(
                "{} {} --> {}",
                decision, self.current_stage_actual, self.next_stage_suggested
            ),
        }
    }
}

//! Per-subject, per-stage statistics derived from the ledger.
//!
//! The table is rebuilt from scratch on every update; nothing here is
//! maintained incrementally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{Decision, TrainingStage};
use crate::ledger::LedgerRecord;

/// Time a subject spent at one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub subject_id: String,
    /// Stage actually run.
    pub stage: TrainingStage,
    /// Number of sessions run at this stage.
    pub session_spent: u32,
    /// First session at this stage.
    pub first_entry: u32,
    /// Last session at this stage.
    pub last_leave: u32,
    /// `last_leave - first_entry + 1`, counting sessions spent elsewhere in
    /// between after a rollback.
    pub session_spanned: u32,
    pub n_stay: u32,
    pub n_progress: u32,
    pub n_rollback: u32,
}

impl StageStats {
    fn new(subject_id: &str, stage: TrainingStage, session: u32) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            stage,
            session_spent: 0,
            first_entry: session,
            last_leave: session,
            session_spanned: 1,
            n_stay: 0,
            n_progress: 0,
            n_rollback: 0,
        }
    }

    fn add(&mut self, record: &LedgerRecord) {
        self.session_spent += 1;
        self.first_entry = self.first_entry.min(record.session);
        self.last_leave = self.last_leave.max(record.session);
        self.session_spanned = self.last_leave - self.first_entry + 1;
        match record.decision {
            Decision::Stay => self.n_stay += 1,
            Decision::Progress => self.n_progress += 1,
            Decision::Rollback => self.n_rollback += 1,
        }
    }
}

/// Group ledger rows by `(subject_id, current_stage_actual)`.
///
/// Rows come back ordered by subject, then by first entry.
pub fn compute_stats(ledger: &[LedgerRecord]) -> Vec<StageStats> {
    let mut groups: BTreeMap<(&str, TrainingStage), StageStats> = BTreeMap::new();

    for record in ledger {
        groups
            .entry((record.subject_id.as_str(), record.current_stage_actual))
            .or_insert_with(|| {
                StageStats::new(&record.subject_id, record.current_stage_actual, record.session)
            })
            .add(record);
    }

    let mut stats: Vec<StageStats> = groups.into_values().collect();
    stats.sort_by(|a, b| {
        a.subject_id
            .cmp(&b.subject_id)
            .then(a.first_entry.cmp(&b.first_entry))
    });
    stats
}

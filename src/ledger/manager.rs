//! The auto-train manager.
//!
//! Owns one ledger. Each [`AutoTrainManager::update`] finds the sessions the
//! ledger has not seen yet, evaluates them subject by subject in session
//! order and saves the result. Re-running an update with no new sessions
//! changes nothing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::core::{CurriculumKey, MetricsSchema, TrainingStage};
use crate::error::{AutoTrainError, Result};
use crate::ledger::{BehaviorRecord, BehaviorTable, LedgerRecord, StageStats};
use crate::resolver::CurriculumResolver;
use crate::storage::{BehaviorSource, CurriculumStore, LedgerStore};

/// A hole in a subject's history that was bridged by a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataGap {
    /// The previous session has no ledger row; an earlier row was used.
    MissingPreviousSession { used_session: u32 },
    /// No earlier ledger row at all; the stage the rig reported was used.
    UntrackedStart { stage: TrainingStage },
    /// No earlier ledger row and no usable reported stage; the curriculum's
    /// entry stage was used.
    EntryStageFallback { stage: TrainingStage },
    /// The reported stage is missing, unknown, or has no rules in the
    /// session's curriculum; the session is open-loop.
    UnrecognizedActualStage { reported: Option<String> },
}

impl fmt::Display for DataGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPreviousSession { used_session } => write!(
                f,
                "previous session missing from ledger, using decision of session {used_session}"
            ),
            Self::UntrackedStart { stage } => write!(
                f,
                "subject did not start under automatic training, using reported stage {stage}"
            ),
            Self::EntryStageFallback { stage } => write!(
                f,
                "no prior decision and no usable reported stage, using entry stage {stage}"
            ),
            Self::UnrecognizedActualStage { reported: Some(raw) } => {
                write!(f, "reported stage '{raw}' is not recognized, treating as open loop")
            }
            Self::UnrecognizedActualStage { reported: None } => {
                write!(f, "no stage reported, treating as open loop")
            }
        }
    }
}

/// Result of evaluating one subject-session.
#[derive(Debug, Clone)]
pub struct SessionEvaluation {
    pub record: LedgerRecord,
    pub gaps: Vec<DataGap>,
}

/// What one update cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateSummary {
    /// Sessions in the source that the ledger had not seen.
    pub new_sessions: usize,
    /// Subjects with at least one new session.
    pub subjects: usize,
    /// Sessions evaluated and appended.
    pub evaluated: usize,
    /// Sessions whose evaluation failed.
    pub failed: usize,
    /// Later sessions of a failed subject, left for the next cycle.
    pub deferred: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl UpdateSummary {
    /// Whether every new session was evaluated.
    pub fn is_complete(&self) -> bool {
        self.evaluated == self.new_sessions
    }
}

/// Drives the rule engine over new sessions and keeps the ledger.
pub struct AutoTrainManager<B, C, L>
where
    B: BehaviorSource,
    C: CurriculumStore,
    L: LedgerStore,
{
    name: String,
    default_curriculum: CurriculumKey,
    source: B,
    resolver: CurriculumResolver<C>,
    store: L,
    ledger: Vec<LedgerRecord>,
    stats: Vec<StageStats>,
}

impl<B, C, L> AutoTrainManager<B, C, L>
where
    B: BehaviorSource,
    C: CurriculumStore,
    L: LedgerStore,
{
    /// Create a manager and load its ledger.
    pub fn new(config: &ManagerConfig, source: B, curricula: C, store: L) -> Result<Self> {
        let ledger = store.load(&config.name)?;
        let stats = super::stats::compute_stats(&ledger);
        info!(manager = %config.name, rows = ledger.len(), "ledger loaded");

        Ok(Self {
            name: config.name.clone(),
            default_curriculum: config.default_curriculum.key(),
            source,
            resolver: CurriculumResolver::new(curricula),
            store,
            ledger,
            stats,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Curriculum used for sessions that do not name one.
    pub fn default_curriculum(&self) -> &CurriculumKey {
        &self.default_curriculum
    }

    pub fn ledger(&self) -> &[LedgerRecord] {
        &self.ledger
    }

    pub fn stats(&self) -> &[StageStats] {
        &self.stats
    }

    /// Ledger row for one subject-session.
    pub fn get(&self, subject_id: &str, session: u32) -> Option<&LedgerRecord> {
        self.ledger
            .iter()
            .find(|r| r.subject_id == subject_id && r.session == session)
    }

    /// Recompute the statistics table from the whole ledger.
    pub fn compute_stats(&mut self) -> &[StageStats] {
        self.stats = super::stats::compute_stats(&self.ledger);
        &self.stats
    }

    /// Evaluate every session the ledger has not seen and save.
    ///
    /// A configuration error aborts only the affected session, and that
    /// subject's later sessions wait for the next cycle. Any other error
    /// aborts the cycle and leaves the ledger as it was.
    pub fn update(&mut self) -> Result<UpdateSummary> {
        let table = self.source.fetch()?;

        let new_sessions: Vec<(String, u32)> = {
            let seen: HashSet<(&str, u32)> = self
                .ledger
                .iter()
                .map(|r| (r.subject_id.as_str(), r.session))
                .collect();
            table
                .records()
                .iter()
                .filter(|r| !seen.contains(&(r.subject_id.as_str(), r.session)))
                .map(|r| (r.subject_id.clone(), r.session))
                .collect()
        };
        let subjects: BTreeSet<&str> = new_sessions.iter().map(|(s, _)| s.as_str()).collect();

        let mut summary = UpdateSummary {
            new_sessions: new_sessions.len(),
            subjects: subjects.len(),
            ..Default::default()
        };
        info!(
            manager = %self.name,
            "Found {} new sessions from {} subjects to evaluate",
            summary.new_sessions,
            summary.subjects
        );

        let checkpoint = self.ledger.len();
        let mut blocked: HashSet<String> = HashSet::new();

        for (subject_id, session) in new_sessions {
            if blocked.contains(&subject_id) {
                summary.deferred += 1;
                continue;
            }

            match self.add_and_evaluate_session(&table, &subject_id, session) {
                Ok(evaluation) => {
                    summary.evaluated += 1;
                    summary.warnings.extend(
                        evaluation
                            .gaps
                            .iter()
                            .map(|gap| format!("subject {subject_id} session {session}: {gap}")),
                    );
                }
                Err(e) if e.is_session_scoped() => {
                    error!(subject_id = %subject_id, session, error = %e, "session evaluation aborted");
                    summary.failed += 1;
                    summary
                        .errors
                        .push(format!("subject {subject_id} session {session}: {e}"));
                    blocked.insert(subject_id);
                }
                Err(e) => {
                    self.ledger.truncate(checkpoint);
                    return Err(e);
                }
            }
        }

        self.compute_stats();
        if let Err(e) = self.store.save(&self.name, &self.ledger, &self.stats) {
            self.ledger.truncate(checkpoint);
            self.compute_stats();
            return Err(e);
        }

        Ok(summary)
    }

    /// Evaluate one subject-session and append it to the ledger.
    ///
    /// A session already in the ledger is returned as is.
    pub fn add_and_evaluate_session(
        &mut self,
        table: &BehaviorTable,
        subject_id: &str,
        session: u32,
    ) -> Result<SessionEvaluation> {
        if let Some(existing) = self.get(subject_id, session) {
            debug!(subject_id, session, "session already in ledger");
            return Ok(SessionEvaluation {
                record: existing.clone(),
                gaps: Vec::new(),
            });
        }

        let record = table
            .get(subject_id, session)
            .ok_or_else(|| AutoTrainError::session_not_found(subject_id, session))?;

        let key = record
            .curriculum
            .clone()
            .unwrap_or_else(|| self.default_curriculum.clone());
        let curriculum = self.resolver.require(&key)?;

        let mut gaps = Vec::new();

        // A reported stage this curriculum has no rules for is treated as
        // unreported.
        let reported = record
            .actual_stage()
            .filter(|stage| curriculum.can_evaluate(*stage));

        let mut prior: Vec<&LedgerRecord> = self
            .ledger
            .iter()
            .filter(|r| r.subject_id == subject_id && r.session < session)
            .collect();
        prior.sort_by_key(|r| r.session);

        let suggested = if session == 1 {
            curriculum.entry_stage()
        } else {
            match prior.last() {
                Some(previous) if previous.session == session - 1 => previous.next_stage_suggested,
                Some(previous) => {
                    gaps.push(DataGap::MissingPreviousSession {
                        used_session: previous.session,
                    });
                    previous.next_stage_suggested
                }
                None => match reported {
                    Some(stage) if !table.is_simulation() => {
                        gaps.push(DataGap::UntrackedStart { stage });
                        stage
                    }
                    _ => {
                        let stage = curriculum.entry_stage();
                        gaps.push(DataGap::EntryStageFallback { stage });
                        stage
                    }
                },
            }
        };

        let (actual, closed_loop) = if table.is_simulation() {
            (suggested, false)
        } else {
            match reported {
                Some(stage) => (stage, true),
                None => {
                    gaps.push(DataGap::UnrecognizedActualStage {
                        reported: record.current_stage_actual.clone(),
                    });
                    (suggested, false)
                }
            }
        };

        let session_at_current_stage = 1 + prior
            .iter()
            .rev()
            .take_while(|r| r.current_stage_actual == actual)
            .count() as u32;

        let schema = curriculum.metrics_schema();
        let histories = collect_histories(schema, table.history(subject_id, session))?;
        let metrics = schema.build(histories, session, session_at_current_stage)?;

        let (decision, next_stage) = curriculum.evaluate_transition(actual, &metrics)?;

        for gap in &gaps {
            warn!(subject_id, session, "{}", gap);
        }

        let row = LedgerRecord {
            subject_id: subject_id.to_string(),
            session_date: record.session_date,
            session,
            curriculum: curriculum.key(),
            session_at_current_stage,
            current_stage_suggested: suggested,
            current_stage_actual: actual,
            if_closed_loop: closed_loop,
            if_overridden_by_trainer: closed_loop && actual != suggested,
            task_metrics: metrics.latest(),
            metrics,
            decision,
            next_stage_suggested: next_stage,
        };

        info!(
            subject_id,
            session,
            stage = %actual,
            decision = %decision,
            "{}",
            row.status_line()
        );

        self.ledger.push(row.clone());
        Ok(SessionEvaluation { record: row, gaps })
    }
}

/// Value of `field` in a row, trying the schema's older column names too.
fn column(record: &BehaviorRecord, schema: MetricsSchema, field: &str) -> Option<f64> {
    record
        .columns
        .get(field)
        .or_else(|| {
            schema
                .aliases(field)
                .iter()
                .find_map(|alias| record.columns.get(*alias))
        })
        .copied()
}

/// Per-field histories over a subject's sessions, oldest first.
fn collect_histories(
    schema: MetricsSchema,
    history: &[BehaviorRecord],
) -> Result<BTreeMap<String, Vec<f64>>> {
    schema
        .history_fields()
        .iter()
        .map(|field| {
            let values = history
                .iter()
                .map(|r| {
                    column(r, schema, field).ok_or_else(|| {
                        AutoTrainError::metrics_schema(format!(
                            "subject {} session {} has no '{}' column",
                            r.subject_id, r.session, field
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            Ok((field.to_string(), values))
        })
        .collect()
}

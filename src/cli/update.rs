//! Update command for autotrain.
//!
//! Runs one reconciliation cycle: evaluates every session the ledger has not
//! seen and prints the decisions that were added.

use serde::{Deserialize, Serialize};

use crate::ledger::{AutoTrainManager, LedgerRecord, UpdateSummary};
use crate::storage::{BehaviorSource, CurriculumStore, LedgerStore};

/// Options for the update command.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// One appended ledger row, flattened for output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInfo {
    pub subject_id: String,
    pub session: u32,
    pub curriculum: String,
    pub stage: String,
    pub decision: String,
    pub next_stage: String,
    pub session_at_current_stage: u32,
    pub closed_loop: bool,
    pub overridden: bool,
}

impl From<&LedgerRecord> for DecisionInfo {
    fn from(record: &LedgerRecord) -> Self {
        Self {
            subject_id: record.subject_id.clone(),
            session: record.session,
            curriculum: record.curriculum.to_string(),
            stage: record.current_stage_actual.to_string(),
            decision: record.decision.to_string(),
            next_stage: record.next_stage_suggested.to_string(),
            session_at_current_stage: record.session_at_current_stage,
            closed_loop: record.if_closed_loop,
            overridden: record.if_overridden_by_trainer,
        }
    }
}

/// Output format for the update command.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutput {
    /// Whether the cycle completed. Per-session failures do not make it
    /// unsuccessful; they are listed in the summary.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<UpdateSummary>,
    /// Rows appended by this cycle.
    pub decisions: Vec<DecisionInfo>,
    /// Ledger size after the cycle.
    pub ledger_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateOutput {
    pub fn success(summary: UpdateSummary, decisions: Vec<DecisionInfo>, ledger_rows: usize) -> Self {
        Self {
            success: true,
            summary: Some(summary),
            decisions,
            ledger_rows,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, ledger_rows: usize) -> Self {
        Self {
            success: false,
            summary: None,
            decisions: Vec::new(),
            ledger_rows,
            error: Some(error.into()),
        }
    }
}

/// The update command implementation.
pub struct UpdateCommand<B, C, L>
where
    B: BehaviorSource,
    C: CurriculumStore,
    L: LedgerStore,
{
    manager: AutoTrainManager<B, C, L>,
}

impl<B, C, L> UpdateCommand<B, C, L>
where
    B: BehaviorSource,
    C: CurriculumStore,
    L: LedgerStore,
{
    pub fn new(manager: AutoTrainManager<B, C, L>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &AutoTrainManager<B, C, L> {
        &self.manager
    }

    /// Run the update command.
    pub fn run(&mut self, _options: &UpdateOptions) -> UpdateOutput {
        let before = self.manager.ledger().len();
        match self.manager.update() {
            Ok(summary) => {
                let decisions = self.manager.ledger()[before..]
                    .iter()
                    .map(DecisionInfo::from)
                    .collect();
                UpdateOutput::success(summary, decisions, self.manager.ledger().len())
            }
            Err(e) => UpdateOutput::failure(e.to_string(), self.manager.ledger().len()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &UpdateOutput, options: &UpdateOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &UpdateOutput) -> String {
        if !output.success {
            return format!(
                "Update failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let Some(summary) = &output.summary else {
            return "Update finished.\n".to_string();
        };

        let mut lines = vec![format!(
            "Evaluated {} of {} new session(s) from {} subject(s).",
            summary.evaluated, summary.new_sessions, summary.subjects
        )];

        for d in &output.decisions {
            let transition = if d.decision == "STAY" {
                format!("STAY at {}", d.stage)
            } else {
                format!("{} {} --> {}", d.decision, d.stage, d.next_stage)
            };
            let mut flags = Vec::new();
            if !d.closed_loop {
                flags.push("open loop");
            }
            if d.overridden {
                flags.push("overridden");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            };
            lines.push(format!(
                "  {} #{}: {}{}",
                d.subject_id, d.session, transition, flags
            ));
        }

        if !summary.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", summary.warnings.len()));
            lines.extend(summary.warnings.iter().map(|w| format!("  {w}")));
        }

        if !summary.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "Failed ({}, {} deferred):",
                summary.failed, summary.deferred
            ));
            lines.extend(summary.errors.iter().map(|e| format!("  {e}")));
        }

        lines.push(format!("Ledger now holds {} row(s).", output.ledger_rows));
        lines.push(String::new());
        lines.join("\n")
    }
}

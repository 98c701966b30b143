//! Stats command for autotrain.
//!
//! Shows how long each subject spent at each stage.

use serde::Serialize;

use crate::error::Result;
use crate::ledger::{compute_stats, StageStats};
use crate::storage::LedgerStore;

/// Options for the stats command.
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Only show one subject.
    pub subject: Option<String>,
}

/// Output format for the stats command.
#[derive(Debug, Clone, Serialize)]
pub struct StatsOutput {
    pub success: bool,
    /// Number of subjects covered.
    pub subjects: usize,
    pub stats: Vec<StageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsOutput {
    pub fn success(stats: Vec<StageStats>) -> Self {
        let mut subjects: Vec<&str> = stats.iter().map(|s| s.subject_id.as_str()).collect();
        subjects.dedup();
        Self {
            success: true,
            subjects: subjects.len(),
            stats,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            subjects: 0,
            stats: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The stats command implementation.
pub struct StatsCommand<L: LedgerStore> {
    store: L,
    manager: String,
}

impl<L: LedgerStore> StatsCommand<L> {
    pub fn new(store: L, manager: impl Into<String>) -> Self {
        Self {
            store,
            manager: manager.into(),
        }
    }

    /// Run the stats command.
    pub fn run(&self, options: &StatsOptions) -> StatsOutput {
        match self.load() {
            Ok(mut stats) => {
                if let Some(subject) = &options.subject {
                    stats.retain(|s| &s.subject_id == subject);
                }
                StatsOutput::success(stats)
            }
            Err(e) => StatsOutput::failure(e.to_string()),
        }
    }

    /// Saved statistics, rebuilt from the ledger when the stats file is
    /// missing.
    fn load(&self) -> Result<Vec<StageStats>> {
        let stats = self.store.load_stats(&self.manager)?;
        if !stats.is_empty() {
            return Ok(stats);
        }
        let ledger = self.store.load(&self.manager)?;
        Ok(compute_stats(&ledger))
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatsOutput, options: &StatsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &StatsOutput) -> String {
        if !output.success {
            return format!(
                "Stats failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if output.stats.is_empty() {
            return format!("No ledger entries for manager '{}'.\n", self.manager);
        }

        let mut lines = vec![format!(
            "{:<12} {:<16} {:>6} {:>6} {:>6} {:>6} {:>5} {:>5} {:>5}",
            "SUBJECT", "STAGE", "SPENT", "FIRST", "LAST", "SPAN", "STAY", "PROG", "BACK"
        )];
        for s in &output.stats {
            lines.push(format!(
                "{:<12} {:<16} {:>6} {:>6} {:>6} {:>6} {:>5} {:>5} {:>5}",
                s.subject_id,
                s.stage.as_str(),
                s.session_spent,
                s.first_entry,
                s.last_leave,
                s.session_spanned,
                s.n_stay,
                s.n_progress,
                s.n_rollback
            ));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

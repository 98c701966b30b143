//! CLI commands for autotrain.
//!
//! - **update**: run one reconciliation cycle over new sessions
//! - **stats**: per-subject, per-stage statistics from the ledger
//! - **curricula**: list, show, install and validate curriculum artifacts

pub mod curricula;
pub mod stats;
pub mod update;

pub use curricula::{CurriculaAction, CurriculaCommand};
pub use stats::StatsCommand;
pub use update::UpdateCommand;

//! Session reconciliation ledger.
//!
//! The ledger is the append-only table of per-subject-session decisions.
//! Each update diffs the behavior source against it, evaluates the unseen
//! sessions in order and persists the result.

pub mod manager;
pub mod record;
pub mod stats;

pub use manager::{AutoTrainManager, DataGap, SessionEvaluation, UpdateSummary};
pub use record::{BehaviorRecord, BehaviorTable, LedgerRecord};
pub use stats::{compute_stats, StageStats};

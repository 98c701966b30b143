//! autotrain - automated training-stage decisions
//!
//! A curriculum is a versioned rule table: for each training stage, an
//! ordered list of transition rules over session metrics. The manager reads
//! completed sessions from a behavior source, evaluates each new
//! subject-session against its curriculum and appends the decision to an
//! append-only ledger, reconciling the suggested stage with the stage the
//! trainer actually ran.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod resolver;
pub mod storage;

pub use config::Config;
pub use core::{
    Condition, Curriculum, CurriculumKey, Decision, Metrics, MetricsSchema, MetricsSnapshot,
    TrainingStage, TransitionRule,
};
pub use error::{AutoTrainError, Result};
pub use ledger::{
    compute_stats, AutoTrainManager, BehaviorRecord, BehaviorTable, LedgerRecord, StageStats,
    UpdateSummary,
};
pub use resolver::{CurriculumResolver, Resolution};
pub use storage::{
    BehaviorSource, CurriculumStore, FileCurriculumStore, FileLedgerStore, JsonlBehaviorSource,
    LedgerStore,
};

// CLI commands
pub use cli::{CurriculaCommand, StatsCommand, UpdateCommand};

//! Core types and logic for autotrain.
//!
//! This module contains the rule engine: training stages, parameter bundles,
//! metrics snapshots, rule conditions and the curriculum that ties them
//! together.

pub mod condition;
pub mod curriculum;
pub mod metrics;
pub mod params;
pub mod stage;

pub use condition::{Aggregate, Comparator, Condition, Operand};
pub use curriculum::{
    Curriculum, CurriculumBuilder, CurriculumKey, StageTransitions, TransitionRule,
    ValidationWarning, CURRICULUM_SCHEMA_VERSION,
};
pub use metrics::{
    DummyTaskMetrics, DynamicForagingMetrics, FieldKind, Metrics, MetricsSchema, MetricsSnapshot,
    TaskMetrics, SESSION_AT_CURRENT_STAGE, SESSION_TOTAL,
};
pub use params::ParameterBundle;
pub use stage::{Decision, TrainingStage, UnknownStage};

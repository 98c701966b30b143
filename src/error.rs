//! Unified error types for autotrain.
//!
//! Errors fall into two classes. Configuration-class errors (a missing or
//! incompatible curriculum, a malformed rule condition, a metrics schema
//! mismatch) abort only the subject-session being evaluated; the ledger is
//! left untouched for that session and it is retried on the next update.
//! Source-class errors (the behavior table, the artifact store or the ledger
//! store being unreachable) abort the whole update cycle.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::{CurriculumKey, TrainingStage};

/// The main error type for autotrain operations.
#[derive(Error, Debug)]
pub enum AutoTrainError {
    /// I/O errors from store or ledger file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// The behavior table or an artifact store could not be read.
    #[error("source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// No curriculum artifact exists under the requested key.
    #[error("curriculum not found: {key}")]
    CurriculumNotFound { key: CurriculumKey },

    /// A curriculum artifact exists but cannot be used by this build.
    #[error("curriculum {key} is incompatible: {reason}")]
    CurriculumIncompatible { key: CurriculumKey, reason: String },

    /// The curriculum has no rule table for a non-absorbing stage.
    #[error("no transition rules defined for stage {stage}")]
    MissingRules { stage: TrainingStage },

    /// A rule condition could not be evaluated against a snapshot.
    #[error("condition error: {message}")]
    Condition { message: String },

    /// The behavior table does not provide what the metrics schema needs.
    #[error("metrics schema error: {message}")]
    MetricsSchema { message: String },

    /// The requested subject-session is absent from the behavior table.
    #[error("session not found: subject {subject_id} session {session}")]
    SessionNotFound { subject_id: String, session: u32 },

    /// A published curriculum would be overwritten with different content.
    #[error("curriculum {key} is already published with different content")]
    ArtifactConflict { key: CurriculumKey },
}

/// A specialized Result type for autotrain operations.
pub type Result<T> = std::result::Result<T, AutoTrainError>;

impl AutoTrainError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a source-unavailable error.
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create a curriculum-incompatible error.
    pub fn incompatible(key: CurriculumKey, reason: impl Into<String>) -> Self {
        Self::CurriculumIncompatible {
            key,
            reason: reason.into(),
        }
    }

    /// Create a condition evaluation error.
    pub fn condition(message: impl Into<String>) -> Self {
        Self::Condition {
            message: message.into(),
        }
    }

    /// Create a metrics schema error.
    pub fn metrics_schema(message: impl Into<String>) -> Self {
        Self::MetricsSchema {
            message: message.into(),
        }
    }

    /// Create a session-not-found error.
    pub fn session_not_found(subject_id: impl Into<String>, session: u32) -> Self {
        Self::SessionNotFound {
            subject_id: subject_id.into(),
            session,
        }
    }

    /// Check whether this error only affects the subject-session being evaluated.
    ///
    /// Session-scoped errors are logged and the session is retried on the next
    /// update. Everything else aborts the cycle and leaves the persisted
    /// ledger at its last saved state.
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            Self::CurriculumNotFound { .. }
                | Self::CurriculumIncompatible { .. }
                | Self::MissingRules { .. }
                | Self::Condition { .. }
                | Self::MetricsSchema { .. }
                | Self::SessionNotFound { .. }
        )
    }
}

impl From<io::Error> for AutoTrainError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AutoTrainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Exit codes for the autotrain CLI.
pub mod exit_codes {
    /// The command completed.
    pub const SUCCESS: i32 = 0;

    /// The command ran but reported a failure.
    pub const ERROR: i32 = 1;

    /// The process panicked.
    pub const CRASH: i32 = 3;
}

//! Collaborator traits for autotrain.
//!
//! The manager talks to three external stores: the behavior source it reads
//! sessions from, the artifact store holding published curricula, and the
//! ledger store it persists decisions to.

use std::sync::Arc;

use crate::core::{Curriculum, CurriculumKey};
use crate::error::Result;
use crate::ledger::{BehaviorTable, LedgerRecord, StageStats};

/// Source of completed-session rows.
pub trait BehaviorSource: Send + Sync {
    /// Fetch the full behavior table.
    ///
    /// Failing to reach the source is a `SourceUnavailable` error and aborts
    /// the update cycle.
    fn fetch(&self) -> Result<BehaviorTable>;
}

/// Store of serialized curricula keyed by name, version and schema version.
pub trait CurriculumStore: Send + Sync {
    /// Retrieve the serialized artifact filed under `key`.
    ///
    /// Returns `Ok(None)` if nothing is filed under the key.
    fn get_raw(&self, key: &CurriculumKey) -> Result<Option<String>>;

    /// File a serialized artifact under `key`.
    ///
    /// Filing identical content again is a no-op. Filing different content
    /// under an existing key fails with `ArtifactConflict`.
    fn put_raw(&self, key: &CurriculumKey, content: &str) -> Result<()>;

    /// List every key with a filed artifact, sorted.
    fn list(&self) -> Result<Vec<CurriculumKey>>;

    /// Check if an artifact is filed under `key`.
    fn exists(&self, key: &CurriculumKey) -> Result<bool> {
        Ok(self.get_raw(key)?.is_some())
    }

    /// Publish a curriculum under its own key.
    fn publish(&self, curriculum: &Curriculum) -> Result<()> {
        self.put_raw(&curriculum.key(), &curriculum.to_json()?)
    }
}

/// Persistence for one manager's ledger and derived statistics.
pub trait LedgerStore: Send + Sync {
    /// Load the ledger, or an empty one if the manager has never saved.
    fn load(&self, manager: &str) -> Result<Vec<LedgerRecord>>;

    /// Load the last saved statistics table.
    fn load_stats(&self, manager: &str) -> Result<Vec<StageStats>>;

    /// Replace the saved ledger and statistics.
    fn save(&self, manager: &str, ledger: &[LedgerRecord], stats: &[StageStats]) -> Result<()>;
}

/// Whether two serialized artifacts hold the same JSON value.
pub(crate) fn same_content(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl<T: BehaviorSource + ?Sized> BehaviorSource for Arc<T> {
    fn fetch(&self) -> Result<BehaviorTable> {
        (**self).fetch()
    }
}

impl<T: CurriculumStore + ?Sized> CurriculumStore for Arc<T> {
    fn get_raw(&self, key: &CurriculumKey) -> Result<Option<String>> {
        (**self).get_raw(key)
    }

    fn put_raw(&self, key: &CurriculumKey, content: &str) -> Result<()> {
        (**self).put_raw(key, content)
    }

    fn list(&self) -> Result<Vec<CurriculumKey>> {
        (**self).list()
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    fn load(&self, manager: &str) -> Result<Vec<LedgerRecord>> {
        (**self).load(manager)
    }

    fn load_stats(&self, manager: &str) -> Result<Vec<StageStats>> {
        (**self).load_stats(manager)
    }

    fn save(&self, manager: &str, ledger: &[LedgerRecord], stats: &[StageStats]) -> Result<()> {
        (**self).save(manager, ledger, stats)
    }
}

/// Test utilities for store implementations.
#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::catalog::{coupled_baiting, dummy_task};
    use crate::core::{
        Decision, DummyTaskMetrics, MetricsSnapshot, TrainingStage, CURRICULUM_SCHEMA_VERSION,
    };
    use crate::error::AutoTrainError;
    use chrono::NaiveDate;

    /// A minimal ledger row for store tests.
    pub fn sample_record(subject_id: &str, session: u32) -> LedgerRecord {
        LedgerRecord {
            subject_id: subject_id.to_string(),
            session_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            session,
            curriculum: CurriculumKey::new("Dummy task", "0.2", CURRICULUM_SCHEMA_VERSION),
            session_at_current_stage: 1,
            current_stage_suggested: TrainingStage::Stage1,
            current_stage_actual: TrainingStage::Stage1,
            if_closed_loop: false,
            if_overridden_by_trainer: false,
            task_metrics: Default::default(),
            metrics: MetricsSnapshot::DummyTask(DummyTaskMetrics {
                session_total: session,
                session_at_current_stage: 1,
                dummy_metric_float: vec![0.5; session as usize],
                dummy_metric_int: vec![3.0; session as usize],
            }),
            decision: Decision::Stay,
            next_stage_suggested: TrainingStage::Stage1,
        }
    }

    /// Test helper to verify CurriculumStore implementations.
    pub fn test_curriculum_store_contract<S: CurriculumStore>(store: &S) {
        let baiting = coupled_baiting().unwrap();
        let dummy = dummy_task().unwrap();

        // Initially empty
        assert!(store.list().unwrap().is_empty());
        assert!(!store.exists(&baiting.key()).unwrap());
        assert!(store.get_raw(&baiting.key()).unwrap().is_none());

        store.publish(&baiting).unwrap();
        store.publish(&dummy).unwrap();

        // Read back what was filed
        let raw = store.get_raw(&baiting.key()).unwrap().unwrap();
        let back: Curriculum = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, baiting);

        // Listing is sorted by key
        let mut expected = vec![baiting.key(), dummy.key()];
        expected.sort();
        assert_eq!(store.list().unwrap(), expected);

        // Re-publishing identical content is fine
        store.publish(&baiting).unwrap();

        // Different content under the same key is refused
        let mut tampered: serde_json::Value = serde_json::from_str(&raw).unwrap();
        tampered["curriculum_description"] = "edited in place".into();
        let err = store
            .put_raw(&baiting.key(), &tampered.to_string())
            .unwrap_err();
        assert!(matches!(err, AutoTrainError::ArtifactConflict { .. }));

        // The original survives
        let raw_after = store.get_raw(&baiting.key()).unwrap().unwrap();
        assert!(same_content(&raw, &raw_after));
    }

    /// Test helper to verify LedgerStore implementations.
    pub fn test_ledger_store_contract<S: LedgerStore>(store: &S) {
        // Never saved
        assert!(store.load("lab").unwrap().is_empty());
        assert!(store.load_stats("lab").unwrap().is_empty());

        let ledger = vec![sample_record("m1", 1), sample_record("m1", 2)];
        let stats = crate::ledger::compute_stats(&ledger);
        store.save("lab", &ledger, &stats).unwrap();

        assert_eq!(store.load("lab").unwrap(), ledger);
        assert_eq!(store.load_stats("lab").unwrap(), stats);

        // Managers are isolated
        assert!(store.load("other").unwrap().is_empty());

        // Save replaces
        let shorter = vec![sample_record("m2", 1)];
        store.save("lab", &shorter, &[]).unwrap();
        assert_eq!(store.load("lab").unwrap(), shorter);
        assert!(store.load_stats("lab").unwrap().is_empty());
    }

    #[test]
    fn test_same_content_ignores_formatting() {
        assert!(same_content(r#"{"a": 1, "b": [1, 2]}"#, r#"{"b":[1,2],"a":1}"#));
        assert!(!same_content(r#"{"a": 1}"#, r#"{"a": 2}"#));
        assert!(same_content("not json", "not json"));
    }
}

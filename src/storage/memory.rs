//! In-memory stores for testing.
//!
//! Thread-safe implementations of the collaborator traits, primarily for use
//! in unit tests. Contents are lost when the store is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::core::CurriculumKey;
use crate::error::{AutoTrainError, Result};
use crate::ledger::{BehaviorRecord, BehaviorTable, LedgerRecord, StageStats};
use crate::storage::traits::same_content;
use crate::storage::{BehaviorSource, CurriculumStore, LedgerStore};

/// In-memory behavior source.
///
/// Rows can be appended between updates to mimic new sessions arriving.
#[derive(Debug, Default)]
pub struct MemoryBehaviorSource {
    records: RwLock<Vec<BehaviorRecord>>,
    simulation: bool,
    unavailable: RwLock<bool>,
}

impl MemoryBehaviorSource {
    /// A source whose rows carry actual-stage information.
    pub fn new(records: Vec<BehaviorRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            simulation: false,
            unavailable: RwLock::new(false),
        }
    }

    /// A source without any actual-stage column.
    pub fn simulation(records: Vec<BehaviorRecord>) -> Self {
        Self {
            simulation: true,
            ..Self::new(records)
        }
    }

    /// Append a row.
    pub fn push(&self, record: BehaviorRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Make subsequent fetches fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self
            .unavailable
            .write()
            .unwrap_or_else(PoisonError::into_inner) = unavailable;
    }
}

impl BehaviorSource for MemoryBehaviorSource {
    fn fetch(&self) -> Result<BehaviorTable> {
        if *self.unavailable.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(AutoTrainError::source_unavailable("memory source offline"));
        }
        let records = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(BehaviorTable::new(records, self.simulation))
    }
}

/// In-memory curriculum artifact store.
#[derive(Debug, Default)]
pub struct MemoryCurriculumStore {
    artifacts: RwLock<BTreeMap<CurriculumKey, String>>,
}

impl MemoryCurriculumStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of artifacts in the store.
    pub fn len(&self) -> usize {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CurriculumStore for MemoryCurriculumStore {
    fn get_raw(&self, key: &CurriculumKey) -> Result<Option<String>> {
        let artifacts = self.artifacts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(artifacts.get(key).cloned())
    }

    fn put_raw(&self, key: &CurriculumKey, content: &str) -> Result<()> {
        let mut artifacts = self
            .artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match artifacts.get(key) {
            Some(existing) if same_content(existing, content) => Ok(()),
            Some(_) => Err(AutoTrainError::ArtifactConflict { key: key.clone() }),
            None => {
                artifacts.insert(key.clone(), content.to_string());
                Ok(())
            }
        }
    }

    fn list(&self) -> Result<Vec<CurriculumKey>> {
        let artifacts = self.artifacts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(artifacts.keys().cloned().collect())
    }
}

/// In-memory ledger store.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledgers: RwLock<HashMap<String, (Vec<LedgerRecord>, Vec<StageStats>)>>,
    saves: RwLock<usize>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        *self.saves.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self, manager: &str) -> Result<Vec<LedgerRecord>> {
        let ledgers = self.ledgers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ledgers
            .get(manager)
            .map(|(ledger, _)| ledger.clone())
            .unwrap_or_default())
    }

    fn load_stats(&self, manager: &str) -> Result<Vec<StageStats>> {
        let ledgers = self.ledgers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ledgers
            .get(manager)
            .map(|(_, stats)| stats.clone())
            .unwrap_or_default())
    }

    fn save(&self, manager: &str, ledger: &[LedgerRecord], stats: &[StageStats]) -> Result<()> {
        self.ledgers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(manager.to_string(), (ledger.to_vec(), stats.to_vec()));
        *self.saves.write().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::{
        test_curriculum_store_contract, test_ledger_store_contract,
    };
    use chrono::NaiveDate;

    #[test]
    fn test_memory_curriculum_store_contract() {
        let store = MemoryCurriculumStore::new();
        test_curriculum_store_contract(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_memory_ledger_store_contract() {
        let store = MemoryLedgerStore::new();
        test_ledger_store_contract(&store);
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn test_behavior_source_push_and_outage() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let source = MemoryBehaviorSource::simulation(vec![BehaviorRecord::new("m1", 1, date)]);
        assert_eq!(source.fetch().unwrap().len(), 1);
        assert!(source.fetch().unwrap().is_simulation());

        source.push(BehaviorRecord::new("m1", 2, date));
        assert_eq!(source.fetch().unwrap().len(), 2);

        source.set_unavailable(true);
        assert!(matches!(
            source.fetch(),
            Err(AutoTrainError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_thread_safety() {
        use crate::catalog::builtin_curricula;
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryCurriculumStore::new());
        let builtins = builtin_curricula().unwrap();
        let expected = builtins.len();
        let handles: Vec<_> = builtins
            .into_iter()
            .map(|curriculum| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.publish(&curriculum).unwrap();
                    store.get_raw(&curriculum.key()).unwrap().unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), expected);
    }
}

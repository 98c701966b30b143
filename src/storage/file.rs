//! File-based stores for autotrain.
//!
//! The behavior source is a JSON Lines file. Curricula and ledgers are JSON
//! files in a directory. Writes are atomic via temp file + rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::CurriculumKey;
use crate::error::{AutoTrainError, Result};
use crate::ledger::{BehaviorTable, LedgerRecord, StageStats};
use crate::storage::traits::same_content;
use crate::storage::{BehaviorSource, CurriculumStore, LedgerStore};

/// Create `dir` if it doesn't exist.
fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| AutoTrainError::storage(dir, e))?;
    }
    Ok(())
}

/// Write `content` to `dir/name` atomically using temp file + rename.
fn atomic_write(dir: &Path, name: &str, content: &str) -> Result<()> {
    let final_path = dir.join(name);
    let temp_path = dir.join(format!(".{}.tmp", name));

    {
        let mut file =
            fs::File::create(&temp_path).map_err(|e| AutoTrainError::storage(&temp_path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| AutoTrainError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| AutoTrainError::storage(&temp_path, e))?;
    }

    // Rename temp file to final path (atomic on POSIX)
    fs::rename(&temp_path, &final_path).map_err(|e| AutoTrainError::storage(&final_path, e))?;

    Ok(())
}

/// Read a file, returning `Ok(None)` if it doesn't exist.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AutoTrainError::storage(path, e)),
    }
}

// =============================================================================
// Behavior source
// =============================================================================

/// Behavior table exported as JSON Lines, one completed session per line.
#[derive(Debug, Clone)]
pub struct JsonlBehaviorSource {
    path: PathBuf,
}

impl JsonlBehaviorSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BehaviorSource for JsonlBehaviorSource {
    fn fetch(&self) -> Result<BehaviorTable> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            AutoTrainError::source_unavailable(format!(
                "cannot read behavior table {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let table = BehaviorTable::from_jsonl(&content);
        debug!(
            path = %self.path.display(),
            rows = table.len(),
            simulation = table.is_simulation(),
            "behavior table loaded"
        );
        Ok(table)
    }
}

// =============================================================================
// Curriculum artifacts
// =============================================================================

/// Curriculum artifacts stored as `curriculum_{name}_{version}_{schema}.json`.
#[derive(Debug, Clone)]
pub struct FileCurriculumStore {
    dir: PathBuf,
}

impl FileCurriculumStore {
    /// Create a store in `dir`, creating the directory if needed.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    /// Get the path for an artifact.
    pub fn artifact_path(&self, key: &CurriculumKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }
}

impl CurriculumStore for FileCurriculumStore {
    fn get_raw(&self, key: &CurriculumKey) -> Result<Option<String>> {
        read_optional(&self.artifact_path(key))
    }

    fn put_raw(&self, key: &CurriculumKey, content: &str) -> Result<()> {
        if let Some(existing) = self.get_raw(key)? {
            if same_content(&existing, content) {
                return Ok(());
            }
            return Err(AutoTrainError::ArtifactConflict { key: key.clone() });
        }
        atomic_write(&self.dir, &format!("{}.json", key.file_stem()), content)
    }

    fn list(&self) -> Result<Vec<CurriculumKey>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| AutoTrainError::storage(&self.dir, e))?;
        let mut keys = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| AutoTrainError::storage(&self.dir, e))?;
            let path = entry.path();

            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            // Temp files start with '.', other files are not ours
            if !stem.starts_with("curriculum_") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<CurriculumKey>(&content).ok());
            match parsed {
                Some(key) if key.file_stem() == stem => keys.push(key),
                Some(key) => warn!(
                    path = %path.display(),
                    embedded = %key,
                    "curriculum artifact is filed under the wrong name; skipped"
                ),
                None => warn!(path = %path.display(), "unreadable curriculum artifact; skipped"),
            }
        }

        keys.sort();
        Ok(keys)
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Ledger stored as `ledger_{manager}.json` plus `ledger_stats_{manager}.json`.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    dir: PathBuf,
}

impl FileLedgerStore {
    /// Create a store in `dir`, creating the directory if needed.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    fn ledger_name(manager: &str) -> String {
        format!("ledger_{}.json", manager)
    }

    fn stats_name(manager: &str) -> String {
        format!("ledger_stats_{}.json", manager)
    }

    /// Get the path of a manager's ledger file.
    pub fn ledger_path(&self, manager: &str) -> PathBuf {
        self.dir.join(Self::ledger_name(manager))
    }

    /// Get the path of a manager's statistics file.
    pub fn stats_path(&self, manager: &str) -> PathBuf {
        self.dir.join(Self::stats_name(manager))
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self, manager: &str) -> Result<Vec<LedgerRecord>> {
        match read_optional(&self.ledger_path(manager))? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(Vec::new()),
        }
    }

    fn load_stats(&self, manager: &str) -> Result<Vec<StageStats>> {
        match read_optional(&self.stats_path(manager))? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, manager: &str, ledger: &[LedgerRecord], stats: &[StageStats]) -> Result<()> {
        let ledger_json = serde_json::to_string_pretty(ledger)?;
        let stats_json = serde_json::to_string_pretty(stats)?;

        // Stats can be recomputed from the ledger, so the ledger goes first.
        atomic_write(&self.dir, &Self::ledger_name(manager), &ledger_json)?;
        atomic_write(&self.dir, &Self::stats_name(manager), &stats_json)?;

        debug!(manager, rows = ledger.len(), "ledger saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::coupled_baiting;
    use crate::storage::traits::tests::{
        sample_record, test_curriculum_store_contract, test_ledger_store_contract,
    };
    use tempfile::TempDir;

    #[test]
    fn test_file_curriculum_store_contract() {
        let dir = TempDir::new().unwrap();
        let store = FileCurriculumStore::with_dir(dir.path()).unwrap();
        test_curriculum_store_contract(&store);
    }

    #[test]
    fn test_file_ledger_store_contract() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::with_dir(dir.path()).unwrap();
        test_ledger_store_contract(&store);
    }

    #[test]
    fn test_with_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("curricula");
        assert!(!nested.exists());

        let _store = FileCurriculumStore::with_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_artifact_path_uses_file_stem() {
        let dir = TempDir::new().unwrap();
        let store = FileCurriculumStore::with_dir(dir.path()).unwrap();
        let path = store.artifact_path(&CurriculumKey::new("Coupled Baiting", "2.3", "1.0"));
        assert!(path.ends_with("curriculum_Coupled_Baiting_2.3_1.0.json"));
    }

    #[test]
    fn test_list_skips_misfiled_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = FileCurriculumStore::with_dir(dir.path()).unwrap();
        let curriculum = coupled_baiting().unwrap();
        store.publish(&curriculum).unwrap();

        // Same content filed under another version's name
        let json = curriculum.to_json().unwrap();
        fs::write(dir.path().join("curriculum_Coupled_Baiting_9.9_1.0.json"), &json).unwrap();
        fs::write(dir.path().join("curriculum_broken_1_1.0.json"), "not json").unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();
        fs::write(dir.path().join(".curriculum_x.json.tmp"), "{}").unwrap();

        assert_eq!(store.list().unwrap(), vec![curriculum.key()]);
    }

    #[test]
    fn test_ledger_files_are_named_by_manager() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::with_dir(dir.path()).unwrap();
        store.save("Janelia", &[sample_record("m1", 1)], &[]).unwrap();

        assert!(dir.path().join("ledger_Janelia.json").exists());
        assert!(dir.path().join("ledger_stats_Janelia.json").exists());
        assert!(!dir.path().join(".ledger_Janelia.json.tmp").exists());
    }

    #[test]
    fn test_ledger_survives_failed_stats_write() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::with_dir(dir.path()).unwrap();
        // A non-empty directory where the stats file belongs blocks the rename
        let blocker = store.stats_path("lab");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        let rows = vec![sample_record("m1", 1), sample_record("m1", 2)];
        assert!(store.save("lab", &rows, &[]).is_err());
        assert_eq!(store.load("lab").unwrap(), rows);
    }

    #[test]
    fn test_corrupt_ledger_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::with_dir(dir.path()).unwrap();
        fs::write(store.ledger_path("lab"), "[{").unwrap();
        assert!(store.load("lab").is_err());
    }

    #[test]
    fn test_jsonl_source_reads_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"subject_id": "m2", "session_date": "2024-03-01", "session": 1, "current_stage_actual": "STAGE_1"}"#,
                "\n",
                r#"{"subject_id": "m1", "session_date": "2024-03-01", "session": 1}"#,
                "\n"
            ),
        )
        .unwrap();

        let table = JsonlBehaviorSource::new(&path).fetch().unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.is_simulation());
        assert_eq!(table.records()[0].subject_id, "m1");
    }

    #[test]
    fn test_missing_jsonl_source_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = JsonlBehaviorSource::new(dir.path().join("missing.jsonl"));
        let err = source.fetch().unwrap_err();
        assert!(matches!(err, AutoTrainError::SourceUnavailable { .. }));
        assert!(!err.is_session_scoped());
    }
}

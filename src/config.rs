//! Configuration loading for autotrain.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.autotrain/config.toml`)
//! 3. User config (`~/.autotrain/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The system runs with sensible defaults
//! when no config exists.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{CurriculumKey, CURRICULUM_SCHEMA_VERSION};
use crate::error::{AutoTrainError, Result};

/// Main configuration struct for autotrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Manager identity and defaults.
    pub manager: ManagerConfig,
    /// Locations of the collaborator stores.
    pub paths: PathsConfig,
}

/// Manager identity and defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Manager name. Each name owns a separate ledger.
    pub name: String,
    /// Curriculum used when a session does not name one.
    pub default_curriculum: DefaultCurriculumConfig,
}

impl ManagerConfig {
    /// Check if a manager name is usable in a file name.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !name.starts_with('.')
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            default_curriculum: DefaultCurriculumConfig::default(),
        }
    }
}

/// Identity of the fallback curriculum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultCurriculumConfig {
    pub name: String,
    pub version: String,
    pub schema_version: String,
}

impl DefaultCurriculumConfig {
    /// The curriculum key.
    pub fn key(&self) -> CurriculumKey {
        CurriculumKey::new(&self.name, &self.version, &self.schema_version)
    }
}

impl Default for DefaultCurriculumConfig {
    fn default() -> Self {
        Self {
            name: "Coupled Baiting".to_string(),
            version: "2.3".to_string(),
            schema_version: CURRICULUM_SCHEMA_VERSION.to_string(),
        }
    }
}

/// Store locations. Unset paths live under the autotrain home.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// JSON Lines behavior table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior_source: Option<PathBuf>,
    /// Directory of curriculum artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curricula_dir: Option<PathBuf>,
    /// Directory of ledger files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_dir: Option<PathBuf>,
}

/// One config file as written. Only the keys it sets are `Some`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
struct ConfigLayer {
    manager: ManagerLayer,
    paths: PathsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
struct ManagerLayer {
    name: Option<String>,
    default_curriculum: CurriculumLayer,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
struct CurriculumLayer {
    name: Option<String>,
    version: Option<String>,
    schema_version: Option<String>,
}

impl Config {
    /// Load configuration with full precedence chain.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. Project config (`.autotrain/config.toml` in cwd)
    /// 3. User config (`~/.autotrain/config.toml`)
    /// 4. Defaults
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        // Layer 4 → 3: Apply user config
        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        // Layer 3 → 2: Apply project config
        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        // Layer 2 → 1: Apply environment variables
        config.apply_env_overrides();

        config
    }

    /// Load user config from `<home>/config.toml`.
    fn load_user_config() -> Option<ConfigLayer> {
        let home = autotrain_home()?;
        Self::load_layer(&home.join("config.toml"))
    }

    /// Load project config from `.autotrain/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<ConfigLayer> {
        Self::load_layer(&cwd.join(".autotrain").join("config.toml"))
    }

    /// Load one layer. A missing file is silent, an invalid one is logged.
    fn load_layer(path: &Path) -> Option<ConfigLayer> {
        if !path.exists() {
            return None;
        }
        match read_toml(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                None
            }
        }
    }

    /// Load a complete config from one file, unset keys taking defaults.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        read_toml(path)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // AUTOTRAIN_MANAGER
        if let Ok(val) = env::var("AUTOTRAIN_MANAGER") {
            if ManagerConfig::is_valid_name(&val) {
                self.manager.name = val;
            } else {
                tracing::warn!(
                    "Invalid AUTOTRAIN_MANAGER value '{}'. Using '{}'.",
                    val,
                    self.manager.name
                );
            }
        }

        // AUTOTRAIN_BEHAVIOR_SOURCE
        if let Some(path) = non_empty_env("AUTOTRAIN_BEHAVIOR_SOURCE") {
            self.paths.behavior_source = Some(path);
        }

        // AUTOTRAIN_CURRICULA_DIR
        if let Some(path) = non_empty_env("AUTOTRAIN_CURRICULA_DIR") {
            self.paths.curricula_dir = Some(path);
        }

        // AUTOTRAIN_LEDGER_DIR
        if let Some(path) = non_empty_env("AUTOTRAIN_LEDGER_DIR") {
            self.paths.ledger_dir = Some(path);
        }
    }

    /// Apply one layer on top of this config.
    ///
    /// Every key the layer sets wins, even when it restates a default.
    fn merge(mut self, layer: ConfigLayer) -> Self {
        if let Some(name) = layer.manager.name {
            if ManagerConfig::is_valid_name(&name) {
                self.manager.name = name;
            } else {
                tracing::warn!(
                    "Invalid manager name '{}' in config. Using '{}'.",
                    name,
                    self.manager.name
                );
            }
        }

        let curriculum = layer.manager.default_curriculum;
        let target = &mut self.manager.default_curriculum;
        if let Some(name) = curriculum.name {
            target.name = name;
        }
        if let Some(version) = curriculum.version {
            target.version = version;
        }
        if let Some(schema_version) = curriculum.schema_version {
            target.schema_version = schema_version;
        }

        if layer.paths.behavior_source.is_some() {
            self.paths.behavior_source = layer.paths.behavior_source;
        }
        if layer.paths.curricula_dir.is_some() {
            self.paths.curricula_dir = layer.paths.curricula_dir;
        }
        if layer.paths.ledger_dir.is_some() {
            self.paths.ledger_dir = layer.paths.ledger_dir;
        }

        self
    }

    /// Path of the behavior table.
    ///
    /// Returns the configured path or `<autotrain_home>/behavior.jsonl`.
    pub fn behavior_source_path(&self) -> Option<PathBuf> {
        self.paths
            .behavior_source
            .clone()
            .or_else(|| autotrain_home().map(|h| h.join("behavior.jsonl")))
    }

    /// Directory of curriculum artifacts.
    ///
    /// Returns the configured path or `<autotrain_home>/curricula/`.
    pub fn curricula_dir(&self) -> Option<PathBuf> {
        self.paths
            .curricula_dir
            .clone()
            .or_else(|| autotrain_home().map(|h| h.join("curricula")))
    }

    /// Directory of ledger files.
    ///
    /// Returns the configured path or `<autotrain_home>/ledger/`.
    pub fn ledger_dir(&self) -> Option<PathBuf> {
        self.paths
            .ledger_dir
            .clone()
            .or_else(|| autotrain_home().map(|h| h.join("ledger")))
    }
}

/// Parse a TOML file.
fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| AutoTrainError::storage(path, e))?;
    toml::from_str(&content).map_err(|e| AutoTrainError::config(e.to_string()))
}

/// Read a path from an environment variable, ignoring empty values.
fn non_empty_env(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Get the autotrain home directory.
///
/// Returns `$AUTOTRAIN_HOME` if set and non-empty, otherwise `~/.autotrain`.
/// Relative `AUTOTRAIN_HOME` values are canonicalized when they exist.
pub fn autotrain_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("AUTOTRAIN_HOME") {
        if home.is_empty() {
            tracing::warn!("AUTOTRAIN_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("AUTOTRAIN_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    // Fall back to ~/.autotrain
    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".autotrain"));
    }

    // Fallback for containerized/minimal environments without HOME
    let fallback_path = fallback_autotrain_home();
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

/// Get fallback home path when HOME is unavailable.
#[cfg(unix)]
fn fallback_autotrain_home() -> PathBuf {
    use std::os::unix::fs::MetadataExt;
    let uid = std::fs::metadata("/").map(|m| m.uid()).unwrap_or(0);
    PathBuf::from(format!("/tmp/autotrain-{}", uid))
}

/// Get fallback home path when HOME is unavailable.
#[cfg(not(unix))]
fn fallback_autotrain_home() -> PathBuf {
    std::env::temp_dir().join("autotrain")
}

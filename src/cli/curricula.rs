//! Curricula command for autotrain.
//!
//! Lists, shows, installs and validates curriculum artifacts.

use serde::Serialize;

use crate::catalog::builtin_curricula;
use crate::core::{Curriculum, CurriculumKey};
use crate::error::Result;
use crate::resolver::{CurriculumResolver, Resolution};
use crate::storage::CurriculumStore;

/// What the curricula command should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurriculaAction {
    /// List every published curriculum.
    List,
    /// Print one curriculum as JSON.
    Show(CurriculumKey),
    /// Publish the built-in curricula.
    Install,
    /// Report structural warnings for one curriculum.
    Validate(CurriculumKey),
}

/// Options for the curricula command.
#[derive(Debug, Clone, Default)]
pub struct CurriculaOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Summary of one published curriculum.
#[derive(Debug, Clone, Serialize)]
pub struct CurriculumInfo {
    pub name: String,
    pub version: String,
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_schema: Option<String>,
    pub stages: Vec<String>,
    /// `ok`, `not found`, or the reason the artifact cannot be used.
    pub status: String,
}

impl CurriculumInfo {
    fn found(curriculum: &Curriculum) -> Self {
        Self {
            name: curriculum.name().to_string(),
            version: curriculum.version().to_string(),
            schema_version: curriculum.schema_version().to_string(),
            metrics_schema: Some(curriculum.metrics_schema().to_string()),
            stages: curriculum
                .stages()
                .into_iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            status: "ok".to_string(),
        }
    }

    fn unusable(key: &CurriculumKey, status: impl Into<String>) -> Self {
        Self {
            name: key.curriculum_name.clone(),
            version: key.curriculum_version.clone(),
            schema_version: key.curriculum_schema_version.clone(),
            metrics_schema: None,
            stages: Vec::new(),
            status: status.into(),
        }
    }
}

/// Output format for the curricula command.
#[derive(Debug, Clone, Serialize)]
pub struct CurriculaOutput {
    pub success: bool,
    pub curricula: Vec<CurriculumInfo>,
    /// Full artifact, for `show`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curriculum: Option<serde_json::Value>,
    /// Keys newly published by `install`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub installed: Vec<String>,
    /// Validation findings, for `validate`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CurriculaOutput {
    fn success(curricula: Vec<CurriculumInfo>) -> Self {
        Self {
            success: true,
            curricula,
            curriculum: None,
            installed: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(Vec::new())
        }
    }
}

/// The curricula command implementation.
pub struct CurriculaCommand<C: CurriculumStore> {
    resolver: CurriculumResolver<C>,
}

impl<C: CurriculumStore> CurriculaCommand<C> {
    pub fn new(store: C) -> Self {
        Self {
            resolver: CurriculumResolver::new(store),
        }
    }

    /// Run the curricula command.
    pub fn run(&mut self, action: &CurriculaAction) -> CurriculaOutput {
        let result = match action {
            CurriculaAction::List => self.list(),
            CurriculaAction::Show(key) => self.show(key),
            CurriculaAction::Install => self.install(),
            CurriculaAction::Validate(key) => self.validate(key),
        };
        result.unwrap_or_else(|e| CurriculaOutput::failure(e.to_string()))
    }

    fn list(&mut self) -> Result<CurriculaOutput> {
        let keys = self.resolver.store().list()?;
        let mut infos = Vec::with_capacity(keys.len());
        for key in &keys {
            infos.push(match self.resolver.resolve(key)? {
                Resolution::Found(curriculum) => CurriculumInfo::found(&curriculum),
                Resolution::NotFound => CurriculumInfo::unusable(key, "not found"),
                Resolution::Incompatible { reason } => CurriculumInfo::unusable(key, reason),
            });
        }
        Ok(CurriculaOutput::success(infos))
    }

    fn show(&mut self, key: &CurriculumKey) -> Result<CurriculaOutput> {
        let curriculum = self.resolver.require(key)?;
        let mut output = CurriculaOutput::success(vec![CurriculumInfo::found(&curriculum)]);
        output.curriculum = Some(serde_json::to_value(curriculum.as_ref())?);
        Ok(output)
    }

    fn install(&mut self) -> Result<CurriculaOutput> {
        let store = self.resolver.store();
        let mut infos = Vec::new();
        let mut installed = Vec::new();
        for curriculum in builtin_curricula()? {
            let key = curriculum.key();
            if !store.exists(&key)? {
                installed.push(key.to_string());
            }
            // Identical content is a no-op; anything else is a conflict.
            store.publish(&curriculum)?;
            infos.push(CurriculumInfo::found(&curriculum));
        }
        let mut output = CurriculaOutput::success(infos);
        output.installed = installed;
        Ok(output)
    }

    fn validate(&mut self, key: &CurriculumKey) -> Result<CurriculaOutput> {
        let curriculum = self.resolver.require(key)?;
        let mut output = CurriculaOutput::success(vec![CurriculumInfo::found(&curriculum)]);
        output.warnings = curriculum
            .validate()
            .iter()
            .map(ToString::to_string)
            .collect();
        Ok(output)
    }

    /// Format output based on options.
    pub fn format_output(
        &self,
        output: &CurriculaOutput,
        action: &CurriculaAction,
        options: &CurriculaOptions,
    ) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        if !output.success {
            return format!(
                "Curricula failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        match action {
            CurriculaAction::Show(_) => output
                .curriculum
                .as_ref()
                .and_then(|c| serde_json::to_string_pretty(c).ok())
                .map(|s| s + "\n")
                .unwrap_or_default(),
            CurriculaAction::List => format_list(output),
            CurriculaAction::Install => {
                if output.installed.is_empty() {
                    "Built-in curricula already installed.\n".to_string()
                } else {
                    let mut lines = vec![format!("Installed {} curriculum(s):", output.installed.len())];
                    lines.extend(output.installed.iter().map(|k| format!("  {k}")));
                    lines.push(String::new());
                    lines.join("\n")
                }
            }
            CurriculaAction::Validate(key) => {
                if output.warnings.is_empty() {
                    format!("{key}: no problems found.\n")
                } else {
                    let mut lines = vec![format!("{key}: {} warning(s)", output.warnings.len())];
                    lines.extend(output.warnings.iter().map(|w| format!("  - {w}")));
                    lines.push(String::new());
                    lines.join("\n")
                }
            }
        }
    }
}

fn format_list(output: &CurriculaOutput) -> String {
    if output.curricula.is_empty() {
        return "No curricula published. Run `autotrain curricula install`.\n".to_string();
    }

    let mut lines = Vec::new();
    for info in &output.curricula {
        let schema = info.metrics_schema.as_deref().unwrap_or("-");
        lines.push(format!(
            "{} v{} (schema {}) [{}] {}",
            info.name, info.version, info.schema_version, schema, info.status
        ));
        if !info.stages.is_empty() {
            lines.push(format!("  stages: {}", info.stages.join(", ")));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{coupled_baiting, COUPLED_BAITING};
    use crate::core::CURRICULUM_SCHEMA_VERSION;
    use crate::storage::MemoryCurriculumStore;

    fn baiting_key() -> CurriculumKey {
        CurriculumKey::new(COUPLED_BAITING, "2.3", CURRICULUM_SCHEMA_VERSION)
    }

    #[test]
    fn test_install_is_repeatable() {
        let mut cmd = CurriculaCommand::new(MemoryCurriculumStore::new());

        let first = cmd.run(&CurriculaAction::Install);
        assert!(first.success);
        assert_eq!(first.installed.len(), 4);
        assert!(first
            .installed
            .contains(&"Uncoupled Without Baiting v2.3.1rwdDelay159 (schema 1.0)".to_string()));

        let second = cmd.run(&CurriculaAction::Install);
        assert!(second.success);
        assert!(second.installed.is_empty());
        assert_eq!(
            cmd.format_output(&second, &CurriculaAction::Install, &CurriculaOptions::default()),
            "Built-in curricula already installed.\n"
        );
    }

    #[test]
    fn test_list_reports_unusable_artifacts() {
        let store = MemoryCurriculumStore::new();
        store.publish(&coupled_baiting().unwrap()).unwrap();
        let broken = CurriculumKey::new("Broken", "1", CURRICULUM_SCHEMA_VERSION);
        store.put_raw(&broken, "{}").unwrap();
        let mut cmd = CurriculaCommand::new(store);

        let output = cmd.run(&CurriculaAction::List);
        assert!(output.success);
        assert_eq!(output.curricula.len(), 2);

        let broken_info = output.curricula.iter().find(|i| i.name == "Broken").unwrap();
        assert_ne!(broken_info.status, "ok");

        let baiting = output
            .curricula
            .iter()
            .find(|i| i.name == COUPLED_BAITING)
            .unwrap();
        assert_eq!(baiting.status, "ok");
        assert_eq!(baiting.metrics_schema.as_deref(), Some("dynamic_foraging"));
        assert!(baiting.stages.contains(&"GRADUATED".to_string()));
    }

    #[test]
    fn test_show_prints_artifact() {
        let mut cmd = CurriculaCommand::new(MemoryCurriculumStore::new());
        cmd.run(&CurriculaAction::Install);

        let action = CurriculaAction::Show(baiting_key());
        let output = cmd.run(&action);
        assert!(output.success);
        let artifact = output.curriculum.as_ref().unwrap();
        assert_eq!(artifact["curriculum_name"], COUPLED_BAITING);

        let text = cmd.format_output(&output, &action, &CurriculaOptions::default());
        assert!(text.contains("\"curriculum_version\": \"2.3\""));
    }

    #[test]
    fn test_show_missing_curriculum_fails() {
        let mut cmd = CurriculaCommand::new(MemoryCurriculumStore::new());
        let action = CurriculaAction::Show(baiting_key());

        let output = cmd.run(&action);
        assert!(!output.success);
        assert!(cmd
            .format_output(&output, &action, &CurriculaOptions::default())
            .contains("curriculum not found"));
    }

    #[test]
    fn test_validate_builtin_is_clean() {
        let mut cmd = CurriculaCommand::new(MemoryCurriculumStore::new());
        cmd.run(&CurriculaAction::Install);

        let action = CurriculaAction::Validate(baiting_key());
        let output = cmd.run(&action);
        assert!(output.success);
        assert!(output.warnings.is_empty(), "{:?}", output.warnings);
        assert!(cmd
            .format_output(&output, &action, &CurriculaOptions::default())
            .ends_with("no problems found.\n"));
    }
}

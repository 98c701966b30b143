//! Curricula: versioned stage parameters plus ordered transition rules.
//!
//! A [`Curriculum`] is immutable once built. Fields are private and there is
//! no setter; changing anything means calling [`Curriculum::revise`] with a
//! new version and building a new value. Subjects that already ran under a
//! published version therefore always resolve to the same rules.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::condition::Condition;
use crate::core::metrics::{Metrics, MetricsSchema};
use crate::core::params::ParameterBundle;
use crate::core::stage::{Decision, TrainingStage};
use crate::error::{AutoTrainError, Result};

/// Version of the curriculum schema understood by this build.
///
/// Artifacts declaring any other schema version are refused by the resolver.
pub const CURRICULUM_SCHEMA_VERSION: &str = "1.0";

/// Identity of a curriculum artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurriculumKey {
    pub curriculum_name: String,
    pub curriculum_version: String,
    pub curriculum_schema_version: String,
}

impl CurriculumKey {
    /// Create a key.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        schema_version: impl Into<String>,
    ) -> Self {
        Self {
            curriculum_name: name.into(),
            curriculum_version: version.into(),
            curriculum_schema_version: schema_version.into(),
        }
    }

    /// File stem for the stored artifact.
    pub fn file_stem(&self) -> String {
        format!(
            "curriculum_{}_{}_{}",
            self.curriculum_name.replace(' ', "_"),
            self.curriculum_version,
            self.curriculum_schema_version
        )
    }
}

impl fmt::Display for CurriculumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} (schema {})",
            self.curriculum_name, self.curriculum_version, self.curriculum_schema_version
        )
    }
}

/// One directed edge out of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub decision: Decision,
    pub to_stage: TrainingStage,
    pub condition: Condition,
    #[serde(default)]
    pub condition_description: String,
}

impl TransitionRule {
    /// Create a rule.
    pub fn new(
        decision: Decision,
        to_stage: TrainingStage,
        description: impl Into<String>,
        condition: Condition,
    ) -> Self {
        Self {
            decision,
            to_stage,
            condition,
            condition_description: description.into(),
        }
    }

    /// A PROGRESS rule.
    pub fn progress(to: TrainingStage, description: impl Into<String>, condition: Condition) -> Self {
        Self::new(Decision::Progress, to, description, condition)
    }

    /// A ROLLBACK rule.
    pub fn rollback(to: TrainingStage, description: impl Into<String>, condition: Condition) -> Self {
        Self::new(Decision::Rollback, to, description, condition)
    }
}

/// Ordered rules out of one stage. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransitions {
    pub from_stage: TrainingStage,
    pub transition_rules: Vec<TransitionRule>,
}

/// A finding from [`Curriculum::validate`].
///
/// None of these stop a curriculum from loading; they are logged so the
/// author can fix the next version.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// A stage with rules, or a rule target, has no parameter bundle.
    MissingParameters { stage: TrainingStage },
    /// A non-absorbing stage has no rules of its own.
    MissingRules { stage: TrainingStage },
    /// `from_stage` disagrees with the key the rules are filed under.
    FromStageMismatch {
        key: TrainingStage,
        declared: TrainingStage,
    },
    /// The description names a window the condition does not use.
    WindowMismatch {
        from: TrainingStage,
        to: TrainingStage,
        described: usize,
        used: Vec<usize>,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameters { stage } => {
                write!(f, "stage {stage} has no parameter bundle")
            }
            Self::MissingRules { stage } => {
                write!(f, "stage {stage} is not absorbing but has no transition rules")
            }
            Self::FromStageMismatch { key, declared } => write!(
                f,
                "rules filed under {key} declare from_stage {declared}"
            ),
            Self::WindowMismatch {
                from,
                to,
                described,
                used,
            } => write!(
                f,
                "rule {from} -> {to} describes a window of {described} sessions but uses {used:?}"
            ),
        }
    }
}

/// A versioned, named set of stage parameters and transition rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curriculum {
    curriculum_name: String,
    curriculum_version: String,
    curriculum_schema_version: String,
    #[serde(default)]
    curriculum_description: String,
    metrics_schema: MetricsSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entry_stage: Option<TrainingStage>,
    parameters: BTreeMap<TrainingStage, ParameterBundle>,
    curriculum: BTreeMap<TrainingStage, StageTransitions>,
}

impl Curriculum {
    /// Start building a curriculum for the current schema version.
    pub fn builder(
        name: impl Into<String>,
        version: impl Into<String>,
        metrics_schema: MetricsSchema,
    ) -> CurriculumBuilder {
        CurriculumBuilder {
            inner: Curriculum {
                curriculum_name: name.into(),
                curriculum_version: version.into(),
                curriculum_schema_version: CURRICULUM_SCHEMA_VERSION.to_string(),
                curriculum_description: String::new(),
                metrics_schema,
                entry_stage: None,
                parameters: BTreeMap::new(),
                curriculum: BTreeMap::new(),
            },
        }
    }

    /// Start a new version based on this one.
    ///
    /// Fails if `version` equals the current version.
    pub fn revise(&self, version: impl Into<String>) -> Result<CurriculumBuilder> {
        let version = version.into();
        if version == self.curriculum_version {
            return Err(AutoTrainError::ArtifactConflict { key: self.key() });
        }
        let mut inner = self.clone();
        inner.curriculum_version = version;
        inner.curriculum_schema_version = CURRICULUM_SCHEMA_VERSION.to_string();
        Ok(CurriculumBuilder { inner })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn key(&self) -> CurriculumKey {
        CurriculumKey::new(
            &self.curriculum_name,
            &self.curriculum_version,
            &self.curriculum_schema_version,
        )
    }

    pub fn name(&self) -> &str {
        &self.curriculum_name
    }

    pub fn version(&self) -> &str {
        &self.curriculum_version
    }

    pub fn schema_version(&self) -> &str {
        &self.curriculum_schema_version
    }

    pub fn description(&self) -> &str {
        &self.curriculum_description
    }

    /// Metrics record the rules are written against.
    pub fn metrics_schema(&self) -> MetricsSchema {
        self.metrics_schema
    }

    pub fn parameters(&self) -> &BTreeMap<TrainingStage, ParameterBundle> {
        &self.parameters
    }

    pub fn parameters_for(&self, stage: TrainingStage) -> Option<&ParameterBundle> {
        self.parameters.get(&stage)
    }

    pub fn transitions(&self) -> &BTreeMap<TrainingStage, StageTransitions> {
        &self.curriculum
    }

    /// Stage a subject starts in at its first session.
    ///
    /// The declared entry stage, else the earliest stage with rules.
    pub fn entry_stage(&self) -> TrainingStage {
        self.entry_stage
            .or_else(|| self.curriculum.keys().next().copied())
            .unwrap_or(TrainingStage::Stage1)
    }

    /// Whether `evaluate_transition` can run from `stage`: it is absorbing
    /// or has a rule table here.
    pub fn can_evaluate(&self, stage: TrainingStage) -> bool {
        stage.is_absorbing() || self.curriculum.contains_key(&stage)
    }

    /// Every stage mentioned anywhere in the curriculum, in order.
    pub fn stages(&self) -> BTreeSet<TrainingStage> {
        let mut stages: BTreeSet<TrainingStage> = self.parameters.keys().copied().collect();
        for (from, transitions) in &self.curriculum {
            stages.insert(*from);
            stages.extend(transitions.transition_rules.iter().map(|r| r.to_stage));
        }
        stages
    }

    /// The first rule from `from_stage` that leads to `to_stage`.
    pub fn get_transition_rule(
        &self,
        from_stage: TrainingStage,
        to_stage: TrainingStage,
    ) -> Option<&TransitionRule> {
        self.curriculum
            .get(&from_stage)?
            .transition_rules
            .iter()
            .find(|rule| rule.to_stage == to_stage)
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Decide the next stage for a subject at `current_stage`.
    ///
    /// `Graduated` short-circuits to stay. Otherwise rules are tried in
    /// order and the first whose condition holds decides; if none holds the
    /// subject stays. A snapshot of the wrong schema, a missing rule table or
    /// a condition that cannot be evaluated is an error, never a non-match.
    pub fn evaluate_transition(
        &self,
        current_stage: TrainingStage,
        metrics: &dyn Metrics,
    ) -> Result<(Decision, TrainingStage)> {
        if current_stage.is_absorbing() {
            return Ok((Decision::Stay, current_stage));
        }

        if metrics.schema() != self.metrics_schema {
            return Err(AutoTrainError::metrics_schema(format!(
                "curriculum {} expects {} metrics, got {}",
                self.key(),
                self.metrics_schema,
                metrics.schema()
            )));
        }

        let transitions = self
            .curriculum
            .get(&current_stage)
            .ok_or(AutoTrainError::MissingRules {
                stage: current_stage,
            })?;

        for rule in &transitions.transition_rules {
            let matched = rule.condition.evaluate(metrics).map_err(|e| {
                AutoTrainError::condition(format!(
                    "rule {} -> {} of {}: {}",
                    current_stage,
                    rule.to_stage,
                    self.key(),
                    e
                ))
            })?;
            if matched {
                return Ok((rule.decision, rule.to_stage));
            }
        }

        Ok((Decision::Stay, current_stage))
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check every condition against the declared metrics schema.
    pub fn check_conditions(&self) -> std::result::Result<(), String> {
        for (from, transitions) in &self.curriculum {
            for rule in &transitions.transition_rules {
                rule.condition
                    .validate(self.metrics_schema)
                    .map_err(|e| format!("rule {} -> {}: {}", from, rule.to_stage, e))?;
            }
        }
        Ok(())
    }

    /// Structural checks that do not prevent loading.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for (key, transitions) in &self.curriculum {
            if transitions.from_stage != *key {
                warnings.push(ValidationWarning::FromStageMismatch {
                    key: *key,
                    declared: transitions.from_stage,
                });
            }

            for rule in &transitions.transition_rules {
                let used = rule.condition.windows();
                for described in described_windows(&rule.condition_description) {
                    if !used.contains(&described) {
                        warnings.push(ValidationWarning::WindowMismatch {
                            from: *key,
                            to: rule.to_stage,
                            described,
                            used: used.clone(),
                        });
                    }
                }
            }
        }

        for stage in self.stages() {
            if stage.is_absorbing() {
                continue;
            }
            if !self.parameters.contains_key(&stage) {
                warnings.push(ValidationWarning::MissingParameters { stage });
            }
            if !self.curriculum.contains_key(&stage) {
                warnings.push(ValidationWarning::MissingRules { stage });
            }
        }

        warnings
    }

    /// Pretty JSON form of the curriculum.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Window sizes named in a rule description ("last 5", "recent 7 sessions").
fn described_windows(description: &str) -> Vec<usize> {
    let tokens: Vec<String> = description
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect();

    tokens
        .windows(2)
        .filter(|pair| pair[0] == "last" || pair[0] == "recent")
        .filter_map(|pair| pair[1].parse::<usize>().ok())
        .collect()
}

/// Builder for [`Curriculum`].
#[derive(Debug, Clone)]
pub struct CurriculumBuilder {
    inner: Curriculum,
}

impl CurriculumBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.inner.curriculum_description = description.into();
        self
    }

    pub fn entry_stage(mut self, stage: TrainingStage) -> Self {
        self.inner.entry_stage = Some(stage);
        self
    }

    pub fn parameters(mut self, stage: TrainingStage, bundle: ParameterBundle) -> Self {
        self.inner.parameters.insert(stage, bundle);
        self
    }

    /// Set the ordered rules out of `from_stage`, replacing any existing ones.
    pub fn transitions(mut self, from_stage: TrainingStage, rules: Vec<TransitionRule>) -> Self {
        self.inner.curriculum.insert(
            from_stage,
            StageTransitions {
                from_stage,
                transition_rules: rules,
            },
        );
        self
    }

    /// Finish the curriculum, rejecting conditions that read unknown fields.
    pub fn build(self) -> Result<Curriculum> {
        let curriculum = self.inner;
        if curriculum.curriculum.contains_key(&TrainingStage::Graduated) {
            return Err(AutoTrainError::incompatible(
                curriculum.key(),
                "GRADUATED is absorbing and cannot have transition rules",
            ));
        }
        curriculum
            .check_conditions()
            .map_err(|reason| AutoTrainError::incompatible(curriculum.key(), reason))?;
        Ok(curriculum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::{last, mean};
    use crate::core::metrics::{DummyTaskMetrics, DynamicForagingMetrics};

    fn foraging(eff: &[f64], trials: &[f64]) -> DynamicForagingMetrics {
        DynamicForagingMetrics {
            session_total: eff.len() as u32,
            session_at_current_stage: 1,
            foraging_efficiency: eff.to_vec(),
            finished_trials: trials.to_vec(),
        }
    }

    fn two_stage() -> Curriculum {
        let bundle = |stage| ParameterBundle::new(stage, "1.0");
        Curriculum::builder("Coupled Baiting", "0.1", MetricsSchema::DynamicForaging)
            .parameters(TrainingStage::Stage1, bundle(TrainingStage::Stage1))
            .parameters(TrainingStage::Stage2, bundle(TrainingStage::Stage2))
            .transitions(
                TrainingStage::Stage1,
                vec![TransitionRule::progress(
                    TrainingStage::Stage2,
                    "Finished trials >= 200 and efficiency >= 0.6",
                    Condition::all([
                        last("finished_trials").ge(200.0),
                        last("foraging_efficiency").ge(0.6),
                    ]),
                )],
            )
            .transitions(
                TrainingStage::Stage2,
                vec![TransitionRule::rollback(
                    TrainingStage::Stage1,
                    "Efficiency < 0.55",
                    last("foraging_efficiency").lt(0.55),
                )],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_progress_scenario() {
        let c = two_stage();
        let result = c
            .evaluate_transition(TrainingStage::Stage1, &foraging(&[0.65], &[250.0]))
            .unwrap();
        assert_eq!(result, (Decision::Progress, TrainingStage::Stage2));
    }

    #[test]
    fn test_stay_scenario() {
        let c = two_stage();
        let result = c
            .evaluate_transition(TrainingStage::Stage1, &foraging(&[0.65], &[150.0]))
            .unwrap();
        assert_eq!(result, (Decision::Stay, TrainingStage::Stage1));
    }

    #[test]
    fn test_rollback_scenario() {
        let c = two_stage();
        let result = c
            .evaluate_transition(TrainingStage::Stage2, &foraging(&[0.50], &[300.0]))
            .unwrap();
        assert_eq!(result, (Decision::Rollback, TrainingStage::Stage1));
    }

    #[test]
    fn test_graduated_short_circuits_before_schema_check() {
        let c = two_stage();
        let wrong = DummyTaskMetrics {
            session_total: 1,
            session_at_current_stage: 1,
            dummy_metric_float: vec![],
            dummy_metric_int: vec![],
        };
        let result = c.evaluate_transition(TrainingStage::Graduated, &wrong).unwrap();
        assert_eq!(result, (Decision::Stay, TrainingStage::Graduated));
    }

    #[test]
    fn test_first_match_wins() {
        let c = Curriculum::builder("Overlap", "1", MetricsSchema::DynamicForaging)
            .transitions(
                TrainingStage::Stage3,
                vec![
                    TransitionRule::progress(
                        TrainingStage::StageFinal,
                        "",
                        last("finished_trials").ge(100.0),
                    ),
                    TransitionRule::rollback(
                        TrainingStage::Stage1,
                        "",
                        last("finished_trials").ge(50.0),
                    ),
                ],
            )
            .build()
            .unwrap();
        let result = c
            .evaluate_transition(TrainingStage::Stage3, &foraging(&[0.5], &[400.0]))
            .unwrap();
        assert_eq!(result, (Decision::Progress, TrainingStage::StageFinal));
    }

    #[test]
    fn test_missing_rule_table_is_error() {
        let c = two_stage();
        let err = c
            .evaluate_transition(TrainingStage::Stage3, &foraging(&[0.5], &[1.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            AutoTrainError::MissingRules {
                stage: TrainingStage::Stage3
            }
        ));
    }

    #[test]
    fn test_can_evaluate() {
        let c = two_stage();
        assert!(c.can_evaluate(TrainingStage::Stage1));
        assert!(c.can_evaluate(TrainingStage::Stage2));
        assert!(c.can_evaluate(TrainingStage::Graduated));
        assert!(!c.can_evaluate(TrainingStage::Stage3));
        assert!(!c.can_evaluate(TrainingStage::Stage1Warmup));
    }

    #[test]
    fn test_wrong_schema_is_error() {
        let c = two_stage();
        let m = DummyTaskMetrics {
            session_total: 1,
            session_at_current_stage: 1,
            dummy_metric_float: vec![1.0],
            dummy_metric_int: vec![1.0],
        };
        let err = c.evaluate_transition(TrainingStage::Stage1, &m).unwrap_err();
        assert!(matches!(err, AutoTrainError::MetricsSchema { .. }));
    }

    #[test]
    fn test_condition_error_propagates() {
        let c = two_stage();
        let err = c
            .evaluate_transition(TrainingStage::Stage1, &foraging(&[], &[]))
            .unwrap_err();
        assert!(matches!(err, AutoTrainError::Condition { .. }));
        assert!(err.to_string().contains("STAGE_1 -> STAGE_2"));
    }

    #[test]
    fn test_build_rejects_unknown_fields() {
        let err = Curriculum::builder("Bad", "1", MetricsSchema::DynamicForaging)
            .transitions(
                TrainingStage::Stage1,
                vec![TransitionRule::progress(
                    TrainingStage::Stage2,
                    "",
                    last("dummy_metric_int").gt(1.0),
                )],
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, AutoTrainError::CurriculumIncompatible { .. }));
    }

    #[test]
    fn test_build_rejects_rules_on_graduated() {
        let result = Curriculum::builder("Bad", "1", MetricsSchema::DynamicForaging)
            .transitions(TrainingStage::Graduated, vec![])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_stage() {
        let c = two_stage();
        assert_eq!(c.entry_stage(), TrainingStage::Stage1);

        let declared = c
            .revise("0.2")
            .unwrap()
            .entry_stage(TrainingStage::Stage2)
            .build()
            .unwrap();
        assert_eq!(declared.entry_stage(), TrainingStage::Stage2);
    }

    #[test]
    fn test_revise_requires_new_version() {
        let c = two_stage();
        assert!(c.revise("0.1").is_err());

        let revised = c.revise("0.2").unwrap().description("tweaked").build().unwrap();
        assert_eq!(revised.version(), "0.2");
        assert_eq!(revised.description(), "tweaked");
        // Original is unchanged.
        assert_eq!(c.version(), "0.1");
        assert_eq!(c.description(), "");
    }

    #[test]
    fn test_get_transition_rule() {
        let c = two_stage();
        let rule = c
            .get_transition_rule(TrainingStage::Stage2, TrainingStage::Stage1)
            .unwrap();
        assert_eq!(rule.decision, Decision::Rollback);
        assert!(c
            .get_transition_rule(TrainingStage::Stage1, TrainingStage::Stage3)
            .is_none());
    }

    #[test]
    fn test_validate_clean_curriculum() {
        assert!(two_stage().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_missing_parameters_and_rules() {
        let c = Curriculum::builder("Gaps", "1", MetricsSchema::DynamicForaging)
            .transitions(
                TrainingStage::Stage1,
                vec![
                    TransitionRule::progress(
                        TrainingStage::Stage2,
                        "",
                        last("finished_trials").ge(1.0),
                    ),
                    TransitionRule::progress(
                        TrainingStage::Graduated,
                        "",
                        last("finished_trials").ge(1000.0),
                    ),
                ],
            )
            .build()
            .unwrap();
        let warnings = c.validate();
        assert!(warnings.contains(&ValidationWarning::MissingParameters {
            stage: TrainingStage::Stage1
        }));
        assert!(warnings.contains(&ValidationWarning::MissingRules {
            stage: TrainingStage::Stage2
        }));
        // Graduated never needs parameters or rules.
        assert!(!warnings.iter().any(|w| w.to_string().contains("GRADUATED")));
    }

    #[test]
    fn test_validate_flags_window_mismatch() {
        let c = Curriculum::builder("Windows", "1", MetricsSchema::DynamicForaging)
            .parameters(
                TrainingStage::StageFinal,
                ParameterBundle::new(TrainingStage::StageFinal, "1.0"),
            )
            .transitions(
                TrainingStage::StageFinal,
                vec![TransitionRule::rollback(
                    TrainingStage::StageFinal,
                    "For the last 7 sessions, mean finished trials < 300",
                    mean("finished_trials", 5).lt(300.0),
                )],
            )
            .build()
            .unwrap();
        let warnings = c.validate();
        assert_eq!(
            warnings,
            vec![ValidationWarning::WindowMismatch {
                from: TrainingStage::StageFinal,
                to: TrainingStage::StageFinal,
                described: 7,
                used: vec![5],
            }]
        );
    }

    #[test]
    fn test_validate_from_stage_mismatch_from_json() {
        let mut value = serde_json::to_value(two_stage()).unwrap();
        value["curriculum"]["STAGE_2"]["from_stage"] = "STAGE_1".into();
        let c: Curriculum = serde_json::from_value(value).unwrap();
        assert!(c.validate().contains(&ValidationWarning::FromStageMismatch {
            key: TrainingStage::Stage2,
            declared: TrainingStage::Stage1,
        }));
    }

    #[test]
    fn test_described_windows() {
        assert_eq!(described_windows("For recent 5 sessions, mean >= 450"), vec![5]);
        assert_eq!(described_windows("Last 7 sessions"), vec![7]);
        assert!(described_windows("Finished trials >= 200").is_empty());
    }

    #[test]
    fn test_json_round_trip_keeps_identity() {
        let c = two_stage();
        let json = c.to_json().unwrap();
        assert!(json.contains("\"curriculum_schema_version\": \"1.0\""));
        assert!(json.contains("\"STAGE_1\""));
        let back: Curriculum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert_eq!(back.key(), CurriculumKey::new("Coupled Baiting", "0.1", "1.0"));
    }

    #[test]
    fn test_key_file_stem() {
        let key = CurriculumKey::new("Coupled Baiting", "2.3", "1.0");
        assert_eq!(key.file_stem(), "curriculum_Coupled_Baiting_2.3_1.0");
    }
}

//! Training stages and transition decisions.
//!
//! Both enums carry a canonical string tag (`STAGE_2`, `progress`) that is
//! independent of the in-memory representation. The tag is used for
//! serialization, for stage-keyed map keys and for `to_stage` references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named phase of training.
///
/// Variants are declared in curriculum order, so `Ord` follows the usual
/// progression from warmup to graduation. `Graduated` is absorbing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TrainingStage {
    #[serde(rename = "STAGE_1_WARMUP")]
    Stage1Warmup,
    #[serde(rename = "STAGE_1")]
    Stage1,
    #[serde(rename = "STAGE_2")]
    Stage2,
    #[serde(rename = "STAGE_3")]
    Stage3,
    #[serde(rename = "STAGE_4")]
    Stage4,
    #[serde(rename = "STAGE_5")]
    Stage5,
    #[serde(rename = "STAGE_FINAL")]
    StageFinal,
    #[serde(rename = "GRADUATED")]
    Graduated,
}

impl TrainingStage {
    /// All stages in curriculum order.
    pub const ALL: [TrainingStage; 8] = [
        TrainingStage::Stage1Warmup,
        TrainingStage::Stage1,
        TrainingStage::Stage2,
        TrainingStage::Stage3,
        TrainingStage::Stage4,
        TrainingStage::Stage5,
        TrainingStage::StageFinal,
        TrainingStage::Graduated,
    ];

    /// Canonical tag used in every serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stage1Warmup => "STAGE_1_WARMUP",
            Self::Stage1 => "STAGE_1",
            Self::Stage2 => "STAGE_2",
            Self::Stage3 => "STAGE_3",
            Self::Stage4 => "STAGE_4",
            Self::Stage5 => "STAGE_5",
            Self::StageFinal => "STAGE_FINAL",
            Self::Graduated => "GRADUATED",
        }
    }

    /// Human-readable label, as shown on the rig.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stage1Warmup => "Stage 1 w/warmup",
            Self::Stage1 => "Stage 1",
            Self::Stage2 => "Stage 2",
            Self::Stage3 => "Stage 3",
            Self::Stage4 => "Stage 4",
            Self::Stage5 => "Stage 5",
            Self::StageFinal => "Stage final",
            Self::Graduated => "Graduated",
        }
    }

    /// Whether the stage is absorbing (no outgoing transitions).
    pub fn is_absorbing(&self) -> bool {
        matches!(self, Self::Graduated)
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a recognized stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStage(pub String);

impl fmt::Display for UnknownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown training stage '{}'", self.0)
    }
}

impl std::error::Error for UnknownStage {}

impl FromStr for TrainingStage {
    type Err = UnknownStage;

    /// Parse either the canonical tag or the human label (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|stage| {
                stage.as_str().eq_ignore_ascii_case(trimmed)
                    || stage.label().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Intent of a transition.
///
/// Purely descriptive: a rollback may point at any stage, and a progress
/// rule may even point back at the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Stay,
    Progress,
    Rollback,
}

impl Decision {
    /// Upper-case name used in status lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stay => "STAY",
            Self::Progress => "PROGRESS",
            Self::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_follows_curriculum() {
        assert!(TrainingStage::Stage1Warmup < TrainingStage::Stage1);
        assert!(TrainingStage::Stage5 < TrainingStage::StageFinal);
        assert!(TrainingStage::StageFinal < TrainingStage::Graduated);
    }

    #[test]
    fn test_stage_serde_uses_tag() {
        let json = serde_json::to_string(&TrainingStage::StageFinal).unwrap();
        assert_eq!(json, "\"STAGE_FINAL\"");
        let back: TrainingStage = serde_json::from_str("\"STAGE_1_WARMUP\"").unwrap();
        assert_eq!(back, TrainingStage::Stage1Warmup);
    }

    #[test]
    fn test_stage_keys_in_maps() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(TrainingStage::Stage2, 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"STAGE_2":1}"#);
    }

    #[test]
    fn test_parse_tag_and_label() {
        assert_eq!("STAGE_3".parse::<TrainingStage>().unwrap(), TrainingStage::Stage3);
        assert_eq!("Stage 3".parse::<TrainingStage>().unwrap(), TrainingStage::Stage3);
        assert_eq!(" graduated ".parse::<TrainingStage>().unwrap(), TrainingStage::Graduated);
        assert!("Stage 9".parse::<TrainingStage>().is_err());
        assert!("".parse::<TrainingStage>().is_err());
    }

    #[test]
    fn test_only_graduated_is_absorbing() {
        for stage in TrainingStage::ALL {
            assert_eq!(stage.is_absorbing(), stage == TrainingStage::Graduated);
        }
    }

    #[test]
    fn test_decision_serde_and_name() {
        assert_eq!(serde_json::to_string(&Decision::Rollback).unwrap(), "\"rollback\"");
        assert_eq!(Decision::Progress.name(), "PROGRESS");
        assert_eq!(Decision::Stay.to_string(), "STAY");
    }
}

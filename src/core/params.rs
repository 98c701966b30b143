//! Per-stage parameter bundles.
//!
//! The numeric parameters consumed by a task (block lengths, reward sums,
//! auto-water thresholds and so on) are opaque to the rule engine. A bundle
//! records which stage and task schema version it belongs to and carries the
//! values as an ordered JSON map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::TrainingStage;

/// Parameters for one training stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterBundle {
    /// Stage these parameters are meant for.
    pub training_stage: TrainingStage,
    /// Version of the task's parameter schema (what the rig accepts).
    pub task_schema_version: String,
    /// Free-text description of this set of parameters.
    #[serde(default)]
    pub description: String,
    /// Parameter values keyed by the rig's field names.
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl ParameterBundle {
    /// Create an empty bundle for a stage.
    pub fn new(training_stage: TrainingStage, task_schema_version: impl Into<String>) -> Self {
        Self {
            training_stage,
            task_schema_version: task_schema_version.into(),
            description: String::new(),
            values: Map::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set one parameter value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Derive the bundle for another stage, overriding some values.
    ///
    /// Curricula usually describe stage N+1 as "stage N, except ...".
    pub fn derive(
        &self,
        training_stage: TrainingStage,
        description: impl Into<String>,
        overrides: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        let mut values = self.values.clone();
        for (key, value) in overrides {
            values.insert(key.to_string(), value);
        }
        Self {
            training_stage,
            task_schema_version: self.task_schema_version.clone(),
            description: description.into(),
            values,
        }
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

//! Curriculum resolution.
//!
//! Turns a `(name, version, schema_version)` key into a usable
//! [`Curriculum`]. An artifact that is absent and an artifact that exists but
//! cannot be used by this build are reported differently: the first is
//! routine, the second needs an operator.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::{Curriculum, CurriculumKey, CURRICULUM_SCHEMA_VERSION};
use crate::error::{AutoTrainError, Result};
use crate::storage::CurriculumStore;

/// Outcome of a lookup.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The curriculum, shared with every other user of the same key.
    Found(Arc<Curriculum>),
    /// Nothing is filed under the key.
    NotFound,
    /// Something is filed under the key but this build cannot use it.
    Incompatible { reason: String },
}

impl Resolution {
    /// Convert into the curriculum or the matching error.
    pub fn into_result(self, key: &CurriculumKey) -> Result<Arc<Curriculum>> {
        match self {
            Self::Found(curriculum) => Ok(curriculum),
            Self::NotFound => Err(AutoTrainError::CurriculumNotFound { key: key.clone() }),
            Self::Incompatible { reason } => Err(AutoTrainError::incompatible(key.clone(), reason)),
        }
    }
}

/// Resolves curricula from an artifact store, caching what it finds.
///
/// Only successful lookups are cached. Published artifacts never change,
/// while a missing or broken one may be fixed between cycles.
#[derive(Debug)]
pub struct CurriculumResolver<C: CurriculumStore> {
    store: C,
    cache: HashMap<CurriculumKey, Arc<Curriculum>>,
}

impl<C: CurriculumStore> CurriculumResolver<C> {
    pub fn new(store: C) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Look up a curriculum.
    ///
    /// Only a failure to read the store is an `Err`; every problem with the
    /// artifact itself is a [`Resolution`].
    pub fn resolve(&mut self, key: &CurriculumKey) -> Result<Resolution> {
        if let Some(curriculum) = self.cache.get(key) {
            return Ok(Resolution::Found(Arc::clone(curriculum)));
        }

        let Some(raw) = self.store.get_raw(key)? else {
            return Ok(Resolution::NotFound);
        };

        let curriculum = match parse_artifact(key, &raw) {
            Ok(curriculum) => Arc::new(curriculum),
            Err(reason) => {
                warn!(curriculum = %key, %reason, "curriculum artifact is incompatible");
                return Ok(Resolution::Incompatible { reason });
            }
        };

        for finding in curriculum.validate() {
            warn!(curriculum = %key, "{}", finding);
        }
        debug!(curriculum = %key, schema = %curriculum.metrics_schema(), "curriculum resolved");

        self.cache.insert(key.clone(), Arc::clone(&curriculum));
        Ok(Resolution::Found(curriculum))
    }

    /// Look up a curriculum, turning a miss into an error.
    pub fn require(&mut self, key: &CurriculumKey) -> Result<Arc<Curriculum>> {
        self.resolve(key)?.into_result(key)
    }
}

/// Deserialize and check an artifact against the key it was filed under.
fn parse_artifact(key: &CurriculumKey, raw: &str) -> std::result::Result<Curriculum, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))?;

    let declared = |field: &str| value.get(field).and_then(Value::as_str).unwrap_or_default();
    let identity = [
        ("curriculum_name", &key.curriculum_name),
        ("curriculum_version", &key.curriculum_version),
        ("curriculum_schema_version", &key.curriculum_schema_version),
    ];
    for (field, expected) in identity {
        if declared(field) != expected.as_str() {
            return Err(format!(
                "artifact declares {field} '{}' but is filed as '{expected}'",
                declared(field)
            ));
        }
    }

    if key.curriculum_schema_version != CURRICULUM_SCHEMA_VERSION {
        return Err(format!(
            "schema version {} is not supported by this build (expected {})",
            key.curriculum_schema_version, CURRICULUM_SCHEMA_VERSION
        ));
    }

    let curriculum: Curriculum =
        serde_json::from_value(value).map_err(|e| format!("malformed curriculum: {e}"))?;
    curriculum.check_conditions()?;
    Ok(curriculum)
}

//! Evaluation context: caller-supplied facts that conditions and rules read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form JSON attributes (`sport`, `season`, `phase`, ...).
///
/// Participates in evaluation cache keys through its canonical digest, so
/// two contexts with the same attributes in a different order share entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvaluationContext {
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Look up a dot-separated path (`season.phase`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.attributes.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<serde_json::Map<String, Value>> for EvaluationContext {
    fn from(attributes: serde_json::Map<String, Value>) -> Self {
        Self { attributes }
    }
}

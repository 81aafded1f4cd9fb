//! The value every validator inspects.
//!
//! The addon metadata and bundle manifests are kept as raw JSON; their schema
//! belongs to the individual checks, not to the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Addon metadata together with its unpacked bundles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonSubject {
    /// Parsed addon metadata document.
    pub metadata: Value,
    #[serde(default)]
    pub bundles: Vec<AddonBundle>,
}

/// One versioned bundle extracted from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonBundle {
    pub version: String,
    #[serde(default)]
    pub manifests: Vec<Value>,
}

impl AddonSubject {
    pub fn new(metadata: Value) -> Self {
        Self {
            metadata,
            bundles: Vec::new(),
        }
    }

    /// String field of the metadata document, if present.
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(Value::as_str)
    }
}

//! Cross-cutting request/response metadata: provenance, warnings, semantic drift.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Fidelity of a recorded semantic transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    Lossless,
    Approximate,
    Lossy,
}

/// Records a parameter conversion an adapter had to apply because the
/// destination dialect or provider could not represent the value as-is.
///
/// Attached to `metadata.warnings`, which is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticTransform {
    pub parameter: String,
    pub original_value: Value,
    pub transformed_value: Value,
    pub reason: String,
    pub fidelity: Fidelity,
}

/// A single stage's identity, recorded in `Provenance` as the pipeline
/// progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,
}

/// A single warning appended during translation or execution. Distinct from
/// `SemanticTransform` (which is always a warning) because plain advisory
/// notices (e.g. "dropped unsupported field X") carry no before/after pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    SemanticTransform(SemanticTransform),
    Notice { message: String },
}

/// Metadata carried on every IR request, response, and stream chunk.
///
/// `request_id` is mandatory and unique per request: it is generated once by
/// the Bridge and threaded unchanged through every subsequent value produced
/// for that request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub request_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub provenance: Provenance,
    /// Append-only: every pipeline stage may only push, never remove or
    /// reorder entries here.
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default = "default_semantic_version")]
    pub semantic_version: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, Value>,
}

fn default_semantic_version() -> String {
    "1.0".to_string()
}

impl Metadata {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: chrono::Utc::now(),
            provenance: Provenance::default(),
            warnings: Vec::new(),
            semantic_version: default_semantic_version(),
            custom: HashMap::new(),
        }
    }

    /// Returns a clone with one more warning appended. Never mutates `self`
    /// in place — callers replace their metadata value with the result, so a
    /// reference held upstream never observes a warning list changing
    /// underneath it.
    pub fn with_warning(&self, warning: Warning) -> Self {
        let mut next = self.clone();
        next.warnings.push(warning);
        next
    }

    pub fn with_semantic_transform(&self, transform: SemanticTransform) -> Self {
        self.with_warning(Warning::SemanticTransform(transform))
    }

    pub fn custom_latency_ms(&self) -> Option<u64> {
        self.custom.get("latency_ms").and_then(Value::as_u64)
    }

    pub fn set_latency_ms(&mut self, latency_ms: u64) {
        self.custom
            .insert("latency_ms".to_string(), Value::from(latency_ms));
    }
}

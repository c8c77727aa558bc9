//! On-disk per-backend configuration entry.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::BackendConfig;
use crate::error::{GatewayError, GatewayResult};

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// One backend's configuration as it appears in a gateway YAML file. `name`
/// is the registration key in a [`crate::router::Router`]; `provider_type`
/// selects which concrete backend constructor interprets the rest of the
/// fields (not encoded in the type system here, since the set of provider
/// types is an open, data-driven list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEntry {
    pub name: String,
    pub provider_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Routing weight hint, not enforced by the built-in routing
    /// strategies but carried through to `BackendInfo`.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub debug: bool,
    /// Advisory requests-per-minute descriptor, surfaced to routing
    /// strategies as an input but never enforced as a limiter.
    #[serde(default)]
    pub rpm: Option<u32>,
    /// Advisory tokens-per-minute descriptor, same scope as `rpm`.
    #[serde(default)]
    pub tpm: Option<u32>,
}

impl BackendEntry {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.name.is_empty() {
            return Err(GatewayError::invalid_request("backend entry missing a name"));
        }
        if self.provider_type.is_empty() {
            return Err(GatewayError::invalid_request(format!(
                "backend '{}' missing provider_type",
                self.name
            )));
        }
        if self.weight < 0.0 {
            return Err(GatewayError::invalid_request(format!(
                "backend '{}' weight must be non-negative",
                self.name
            )));
        }
        Ok(())
    }

    /// Builds the runtime [`BackendConfig`] shared shape. Provider-specific
    /// config structs (e.g. `OllamaConfig`) wrap this plus their own extras.
    pub fn to_backend_config(&self) -> BackendConfig {
        BackendConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            headers: self.headers.clone(),
            debug: self.debug,
            default_model: self.default_model.clone(),
            include_both_stream_fields: false,
        }
    }
}

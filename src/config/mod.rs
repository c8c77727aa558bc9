//! Top-level gateway configuration.
//!
//! `GatewayConfig` is the on-disk (YAML) shape: a `Deserialize`-friendly
//! tree distinct from the runtime `RouterConfig`/`BackendConfig` types
//! (which carry non-serializable pieces like compiled `Regex`es and
//! `Custom` strategy closures) — a split between "what's on disk" and
//! "what the runtime actually holds."

mod backend;
mod bridge;
mod logging;
mod router;

pub use backend::BackendEntry;
pub use bridge::BridgeConfigFile;
pub use logging::LoggingConfig;
pub use router::{ModelPatternEntryFile, RouterConfigFile};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
    #[serde(default)]
    pub router: RouterConfigFile,
    #[serde(default)]
    pub bridge: BridgeConfigFile,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    pub fn from_str(content: &str) -> GatewayResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| GatewayError::invalid_request(format!("failed to parse gateway config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| {
                GatewayError::invalid_request(format!(
                    "failed to read gateway config {:?}: {e}",
                    path.as_ref()
                ))
            })?;
        Self::from_str(&content)
    }

    pub fn to_yaml(&self) -> GatewayResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| GatewayError::internal(format!("failed to serialize gateway config: {e}")))
    }

    /// Validates every nested section by delegating to each sub-struct's
    /// own `validate`.
    pub fn validate(&self) -> GatewayResult<()> {
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            backend.validate()?;
            if !seen.insert(backend.name.clone()) {
                return Err(GatewayError::invalid_request(format!(
                    "duplicate backend name in config: {}",
                    backend.name
                )));
            }
        }
        self.router.validate()?;
        self.bridge.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
backends:
  - name: openai-primary
    provider_type: openai
    api_key: sk-test
    weight: 2.0
router:
  routing_strategy: model_based
  fallback_strategy: sequential
  fallback_chain: [openai-primary]
bridge:
  latency_sample_cap: 256
logging:
  level: debug
"#;
        let config = GatewayConfig::from_str(yaml).unwrap();
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].weight, 2.0);
        assert_eq!(config.bridge.latency_sample_cap, 256);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn default_config_validates() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_backend_names() {
        let yaml = r#"
backends:
  - name: dup
    provider_type: openai
    api_key: a
  - name: dup
    provider_type: anthropic
    api_key: b
"#;
        assert!(GatewayConfig::from_str(yaml).is_err());
    }
}

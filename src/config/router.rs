//! On-disk router configuration.
//!
//! A serializable mirror of [`crate::router::RouterConfig`]. The runtime
//! type carries a compiled `Regex` per model-pattern entry and an optional
//! `Custom` strategy closure, neither of which survives YAML round-tripping,
//! so this file-shape uses plain strings and compiles them on
//! [`RouterConfigFile::build`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::router::{FallbackStrategy, ModelPatternEntry, RouterConfig, RoutingStrategy};

fn default_true() -> bool {
    true
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_timeout_secs() -> u64 {
    60
}

fn default_health_check_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPatternEntryFile {
    pub pattern: String,
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategyFile {
    Explicit,
    ModelBased,
    CostOptimized,
    LatencyOptimized,
    RoundRobin,
    Random,
}

impl Default for RoutingStrategyFile {
    fn default() -> Self {
        Self::Explicit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategyFile {
    None,
    Sequential,
    Parallel,
}

impl Default for FallbackStrategyFile {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfigFile {
    #[serde(default)]
    pub routing_strategy: RoutingStrategyFile,
    #[serde(default)]
    pub fallback_strategy: FallbackStrategyFile,
    #[serde(default)]
    pub default_backend: Option<String>,
    #[serde(default)]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enable_circuit_breaker: bool,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_circuit_breaker_timeout_secs")]
    pub circuit_breaker_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub track_latency: bool,
    #[serde(default)]
    pub track_cost: bool,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    #[serde(default)]
    pub model_mapping: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub model_pattern_mapping: Vec<ModelPatternEntryFile>,
}

impl Default for RouterConfigFile {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategyFile::default(),
            fallback_strategy: FallbackStrategyFile::default(),
            default_backend: None,
            health_check_interval_secs: 0,
            health_check_timeout_secs: default_health_check_timeout_secs(),
            enable_circuit_breaker: true,
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout_secs(),
            track_latency: true,
            track_cost: false,
            fallback_chain: Vec::new(),
            model_mapping: std::collections::HashMap::new(),
            model_pattern_mapping: Vec::new(),
        }
    }
}

impl RouterConfigFile {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.circuit_breaker_threshold == 0 {
            return Err(GatewayError::invalid_request(
                "router.circuit_breaker_threshold must be >= 1",
            ));
        }
        if matches!(self.fallback_strategy, FallbackStrategyFile::Sequential) && self.fallback_chain.is_empty() {
            return Err(GatewayError::invalid_request(
                "router.fallback_strategy 'sequential' requires a non-empty fallback_chain",
            ));
        }
        for entry in &self.model_pattern_mapping {
            regex::Regex::new(&entry.pattern).map_err(|e| {
                GatewayError::invalid_request(format!(
                    "router.model_pattern_mapping pattern '{}' is invalid: {e}",
                    entry.pattern
                ))
            })?;
        }
        Ok(())
    }

    /// Compiles this file-shape into the runtime [`RouterConfig`]. Call
    /// [`RouterConfigFile::validate`] first so a bad regex surfaces as a
    /// normal config error rather than a panic here.
    pub fn build(&self) -> GatewayResult<RouterConfig> {
        self.validate()?;
        let model_pattern_mapping = self
            .model_pattern_mapping
            .iter()
            .map(|entry| {
                regex::Regex::new(&entry.pattern)
                    .map(|pattern| ModelPatternEntry {
                        pattern,
                        backend: entry.backend.clone(),
                    })
                    .map_err(|e| GatewayError::invalid_request(e.to_string()))
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(RouterConfig {
            routing_strategy: match self.routing_strategy {
                RoutingStrategyFile::Explicit => RoutingStrategy::Explicit,
                RoutingStrategyFile::ModelBased => RoutingStrategy::ModelBased,
                RoutingStrategyFile::CostOptimized => RoutingStrategy::CostOptimized,
                RoutingStrategyFile::LatencyOptimized => RoutingStrategy::LatencyOptimized,
                RoutingStrategyFile::RoundRobin => RoutingStrategy::RoundRobin,
                RoutingStrategyFile::Random => RoutingStrategy::Random,
            },
            fallback_strategy: match self.fallback_strategy {
                FallbackStrategyFile::None => FallbackStrategy::None,
                FallbackStrategyFile::Sequential => FallbackStrategy::Sequential,
                FallbackStrategyFile::Parallel => FallbackStrategy::Parallel,
            },
            default_backend: self.default_backend.clone(),
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            health_check_timeout: Duration::from_secs(self.health_check_timeout_secs),
            enable_circuit_breaker: self.enable_circuit_breaker,
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            circuit_breaker_timeout: Duration::from_secs(self.circuit_breaker_timeout_secs),
            track_latency: self.track_latency,
            track_cost: self.track_cost,
            fallback_chain: self.fallback_chain.clone(),
            model_mapping: self.model_mapping.clone(),
            model_pattern_mapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_fallback_requires_chain() {
        let mut file = RouterConfigFile::default();
        file.fallback_strategy = FallbackStrategyFile::Sequential;
        assert!(file.validate().is_err());
        file.fallback_chain = vec!["openai".to_string()];
        assert!(file.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_regex_pattern() {
        let mut file = RouterConfigFile::default();
        file.model_pattern_mapping.push(ModelPatternEntryFile {
            pattern: "(unterminated".to_string(),
            backend: "openai".to_string(),
        });
        assert!(file.validate().is_err());
        assert!(file.build().is_err());
    }

    #[test]
    fn builds_runtime_config_with_compiled_patterns() {
        let mut file = RouterConfigFile::default();
        file.model_pattern_mapping.push(ModelPatternEntryFile {
            pattern: "^gpt-.*".to_string(),
            backend: "openai".to_string(),
        });
        let runtime = file.build().unwrap();
        assert_eq!(runtime.model_pattern_mapping.len(), 1);
        assert!(runtime.model_pattern_mapping[0].pattern.is_match("gpt-4"));
    }
}

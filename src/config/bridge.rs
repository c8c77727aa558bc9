//! On-disk Bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeConfig;
use crate::error::GatewayResult;

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_latency_sample_cap() -> usize {
    512
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfigFile {
    #[serde(default = "default_true")]
    pub auto_request_id: bool,
    /// `0` means no Bridge-level timeout, matching `BridgeConfig::default_timeout: None`.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_latency_sample_cap")]
    pub latency_sample_cap: usize,
}

impl Default for BridgeConfigFile {
    fn default() -> Self {
        Self {
            auto_request_id: true,
            default_timeout_secs: default_timeout_secs(),
            latency_sample_cap: default_latency_sample_cap(),
        }
    }
}

impl BridgeConfigFile {
    pub fn validate(&self) -> GatewayResult<()> {
        self.build().map(|_| ())
    }

    pub fn build(&self) -> GatewayResult<BridgeConfig> {
        let config = BridgeConfig {
            auto_request_id: self.auto_request_id,
            default_timeout: if self.default_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(self.default_timeout_secs))
            },
            latency_sample_cap: self.latency_sample_cap,
        };
        config.validate()?;
        Ok(config)
    }
}

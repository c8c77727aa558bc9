use std::time::Duration;

use crate::error::GatewayResult;

/// Bridge-wide configuration, threaded to every middleware invocation via
/// `RequestContext.config`/`StreamContext.config` so a middleware can read
/// it without the Bridge passing it explicitly on every call.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Auto-generate `metadata.request_id` when a caller's options don't
    /// supply one. The frontend always stamps one via
    /// [`crate::ir::new_request_id`] regardless; this flag governs whether
    /// the Bridge overwrites an explicitly-supplied one from
    /// `RequestOptions::metadata` or leaves it alone.
    pub auto_request_id: bool,
    /// Default per-request timeout applied when `RequestOptions::timeout`
    /// is not set. `None` means no Bridge-level timeout.
    pub default_timeout: Option<Duration>,
    /// Bounded sample size for the Bridge's latency histogram
    /// (p50/p95/p99).
    pub latency_sample_cap: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            auto_request_id: true,
            default_timeout: Some(Duration::from_secs(60)),
            latency_sample_cap: 512,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.latency_sample_cap == 0 {
            return Err(crate::error::GatewayError::invalid_request(
                "bridge config: latency_sample_cap must be greater than zero",
            ));
        }
        Ok(())
    }
}

//! Router configuration.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayResult;
use crate::ir::Request;

/// Inputs available to a `custom` routing strategy.
pub struct SelectionContext<'a> {
    pub request: &'a Request,
    pub available_backends: &'a [String],
}

pub type CustomRoutingFn =
    Arc<dyn Fn(&SelectionContext<'_>) -> GatewayResult<Option<String>> + Send + Sync>;

/// Inputs available to a `custom` fallback strategy after a failure.
pub struct FallbackContext<'a> {
    pub request: &'a Request,
    pub attempted: &'a [String],
    pub last_error: &'a crate::error::GatewayError,
}

pub type CustomFallbackFn =
    Arc<dyn Fn(&FallbackContext<'_>) -> GatewayResult<Option<String>> + Send + Sync>;

#[derive(Clone)]
pub enum RoutingStrategy {
    Explicit,
    ModelBased,
    CostOptimized,
    LatencyOptimized,
    RoundRobin,
    Random,
    Custom(CustomRoutingFn),
}

impl fmt::Debug for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "Explicit"),
            Self::ModelBased => write!(f, "ModelBased"),
            Self::CostOptimized => write!(f, "CostOptimized"),
            Self::LatencyOptimized => write!(f, "LatencyOptimized"),
            Self::RoundRobin => write!(f, "RoundRobin"),
            Self::Random => write!(f, "Random"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Clone)]
pub enum FallbackStrategy {
    None,
    Sequential,
    Parallel,
    Custom(CustomFallbackFn),
}

impl fmt::Debug for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Sequential => write!(f, "Sequential"),
            Self::Parallel => write!(f, "Parallel"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One entry in the ordered model-pattern mapping (an ordered regex list).
#[derive(Clone)]
pub struct ModelPatternEntry {
    pub pattern: Regex,
    pub backend: String,
}

impl fmt::Debug for ModelPatternEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelPatternEntry")
            .field("pattern", &self.pattern.as_str())
            .field("backend", &self.backend)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub routing_strategy: RoutingStrategy,
    pub fallback_strategy: FallbackStrategy,
    pub default_backend: Option<String>,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
    pub enable_circuit_breaker: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
    pub track_latency: bool,
    pub track_cost: bool,
    pub fallback_chain: Vec<String>,
    pub model_mapping: HashMap<String, String>,
    pub model_pattern_mapping: Vec<ModelPatternEntry>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategy::Explicit,
            fallback_strategy: FallbackStrategy::None,
            default_backend: None,
            health_check_interval: Duration::ZERO,
            health_check_timeout: Duration::from_secs(5),
            enable_circuit_breaker: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            track_latency: true,
            track_cost: false,
            fallback_chain: Vec::new(),
            model_mapping: HashMap::new(),
            model_pattern_mapping: Vec::new(),
        }
    }
}

impl RouterConfig {
    /// Mirrors the config crate's per-struct `validate()` pass: checked at
    /// call sites by callers that build config from file, not enforced
    /// inside `Router::new` itself so in-process construction with
    /// sensible Rust defaults never needs to handle a validation error.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.circuit_breaker_threshold == 0 {
            return Err(crate::error::GatewayError::invalid_request(
                "circuit_breaker_threshold must be >= 1",
            ));
        }
        if matches!(self.fallback_strategy, FallbackStrategy::Sequential) && self.fallback_chain.is_empty() {
            return Err(crate::error::GatewayError::invalid_request(
                "sequential fallback strategy requires a non-empty fallback_chain",
            ));
        }
        Ok(())
    }
}

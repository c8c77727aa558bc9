//! Backend selection strategies.

use rand::seq::SliceRandom;

use super::config::{RouterConfig, RoutingStrategy, SelectionContext};
use super::registry::Registry;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::Request;

pub async fn select(
    registry: &Registry,
    config: &RouterConfig,
    request: &Request,
    preferred_backend: Option<&str>,
) -> GatewayResult<String> {
    let healthy = registry.healthy_names(config);
    if healthy.is_empty() {
        return Err(GatewayError::no_backend_available(
            "no healthy, non-circuit-open backend is registered",
        ));
    }

    let chosen = match &config.routing_strategy {
        RoutingStrategy::Explicit => select_explicit(&healthy, config, preferred_backend),
        RoutingStrategy::ModelBased => select_model_based(&healthy, config, request),
        RoutingStrategy::CostOptimized => select_cost_optimized(registry, &healthy, request).await,
        RoutingStrategy::LatencyOptimized => select_latency_optimized(registry, &healthy),
        RoutingStrategy::RoundRobin => select_round_robin(registry, &healthy, request),
        RoutingStrategy::Random => select_random(&healthy),
        RoutingStrategy::Custom(f) => {
            let ctx = SelectionContext {
                request,
                available_backends: &healthy,
            };
            f(&ctx)?
        }
    };

    chosen.ok_or_else(|| {
        GatewayError::no_backend_available("selection strategy found no eligible backend")
    })
}

fn select_explicit(
    healthy: &[String],
    config: &RouterConfig,
    preferred_backend: Option<&str>,
) -> Option<String> {
    if let Some(name) = preferred_backend {
        if healthy.iter().any(|n| n == name) {
            return Some(name.to_string());
        }
    }
    if let Some(name) = &config.default_backend {
        if healthy.iter().any(|n| n == name) {
            return Some(name.clone());
        }
    }
    healthy.first().cloned()
}

fn select_model_based(healthy: &[String], config: &RouterConfig, request: &Request) -> Option<String> {
    let model = request.parameters.as_ref().and_then(|p| p.model.as_deref())?;
    if let Some(name) = config.model_mapping.get(model) {
        if healthy.iter().any(|n| n == name) {
            return Some(name.clone());
        }
    }
    for entry in &config.model_pattern_mapping {
        if entry.pattern.is_match(model) && healthy.iter().any(|n| n == &entry.backend) {
            return Some(entry.backend.clone());
        }
    }
    config
        .default_backend
        .clone()
        .filter(|b| healthy.iter().any(|n| n == b))
}

/// Picks the healthy backend with the lowest `estimate_cost(request)`.
/// Backends with an unknown cost (`None`) are deprioritized — only chosen
/// if every healthy backend is unknown, in
/// which case the first one (registration order) is used.
async fn select_cost_optimized(registry: &Registry, healthy: &[String], request: &Request) -> Option<String> {
    let mut best_known: Option<(&str, f64)> = None;
    for name in healthy {
        let Some(adapter) = registry.adapter(name) else {
            continue;
        };
        if let Some(cost) = adapter.estimate_cost(request).await {
            if best_known.map(|(_, c)| cost < c).unwrap_or(true) {
                best_known = Some((name.as_str(), cost));
            }
        }
    }
    best_known
        .map(|(name, _)| name.to_string())
        .or_else(|| healthy.first().cloned())
}

fn select_latency_optimized(registry: &Registry, healthy: &[String]) -> Option<String> {
    healthy
        .iter()
        .min_by(|a, b| {
            registry
                .p95_latency_ms(a)
                .partial_cmp(&registry.p95_latency_ms(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

fn select_round_robin(registry: &Registry, healthy: &[String], request: &Request) -> Option<String> {
    let key = request
        .parameters
        .as_ref()
        .and_then(|p| p.model.as_deref())
        .unwrap_or("__global__");
    let counter = registry.next_round_robin(key);
    healthy.get(counter as usize % healthy.len()).cloned()
}

fn select_random(healthy: &[String]) -> Option<String> {
    healthy.choose(&mut rand::thread_rng()).cloned()
}

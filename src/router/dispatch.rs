//! Fallback execution and parallel dispatch.
//!
//! Cancellation of losing peers in a parallel race is implemented by
//! simply dropping their futures once a winner is decided — idiomatic Rust:
//! a dropped `reqwest` request future tears down its connection, so no
//! explicit cancellation token needs to thread through
//! [`crate::backends::BackendAdapter`] to cancel in-flight peers.

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::{FallbackContext, FallbackStrategy};
use super::events::RouterEvent;
use super::Router;
use crate::backends::ChunkStream;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{Request, Response};

#[derive(Debug, Clone)]
pub struct Attempt {
    pub backend: String,
    pub error: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug)]
pub struct DispatchOutcome<T> {
    pub result: T,
    pub backend: String,
    pub attempts: Vec<Attempt>,
}

fn next_sequential(router: &Router, attempted: &[String]) -> Option<String> {
    router
        .config
        .fallback_chain
        .iter()
        .find(|n| !attempted.contains(n) && router.registry.is_eligible(n, &router.config))
        .cloned()
}

fn failover_reason(error: &GatewayError) -> String {
    format!("{:?}", error.code).to_lowercase()
}

pub async fn dispatch_sequential(
    router: &Router,
    request: Request,
    preferred_backend: Option<&str>,
    streaming: bool,
) -> GatewayResult<DispatchOutcomeEither> {
    if matches!(router.config.fallback_strategy, FallbackStrategy::Parallel) {
        return dispatch_parallel_fallback(router, request, preferred_backend, streaming).await;
    }

    let mut attempts = Vec::new();
    let mut attempted_names: Vec<String> = Vec::new();
    let mut current = router.select_backend(&request, preferred_backend).await?;

    loop {
        attempted_names.push(current.clone());
        router.emit(RouterEvent::Selected {
            name: current.clone(),
        });

        let adapter = router.registry.adapter(&current).ok_or_else(|| {
            GatewayError::no_backend_available(format!("backend {current} not registered"))
        })?;

        let start = Instant::now();
        let outcome = if streaming {
            adapter
                .execute_stream(request.clone())
                .await
                .map(DispatchResult::Stream)
        } else {
            adapter
                .execute(request.clone())
                .await
                .map(DispatchResult::Response)
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                router.registry.record_success(&current, latency_ms);
                attempts.push(Attempt {
                    backend: current.clone(),
                    error: None,
                    latency_ms,
                });
                return Ok(DispatchOutcomeEither {
                    result,
                    backend: current,
                    attempts,
                });
            }
            Err(err) => {
                router.registry.record_failure(&current, &router.config, latency_ms);
                attempts.push(Attempt {
                    backend: current.clone(),
                    error: Some(err.to_string()),
                    latency_ms,
                });

                if !err.is_retryable {
                    return Err(err);
                }

                let next = match &router.config.fallback_strategy {
                    FallbackStrategy::None => None,
                    FallbackStrategy::Sequential => next_sequential(router, &attempted_names),
                    FallbackStrategy::Parallel => unreachable!("handled above"),
                    FallbackStrategy::Custom(f) => {
                        let ctx = FallbackContext {
                            request: &request,
                            attempted: &attempted_names,
                            last_error: &err,
                        };
                        f(&ctx)?
                    }
                };

                match next {
                    Some(name) if !attempted_names.contains(&name) => {
                        router.emit(RouterEvent::Failover {
                            previous: current.clone(),
                            current: name.clone(),
                            reason: failover_reason(&err),
                        });
                        current = name;
                    }
                    _ => {
                        return Err(GatewayError::all_backends_failed(&attempted_names, err));
                    }
                }
            }
        }
    }
}

/// Either half of a dispatch result, since the sequential/parallel-fallback
/// loop is shared between `execute` and `execute_stream` callers.
pub enum DispatchResult {
    Response(Response),
    Stream(ChunkStream),
}

pub struct DispatchOutcomeEither {
    pub result: DispatchResult,
    pub backend: String,
    pub attempts: Vec<Attempt>,
}

impl DispatchOutcomeEither {
    pub fn map(self) -> DispatchOutcome<Response> {
        match self.result {
            DispatchResult::Response(r) => DispatchOutcome {
                result: r,
                backend: self.backend,
                attempts: self.attempts,
            },
            DispatchResult::Stream(_) => unreachable!("streaming outcome requested as response"),
        }
    }

    pub fn map_stream(self) -> DispatchOutcome<ChunkStream> {
        match self.result {
            DispatchResult::Stream(s) => DispatchOutcome {
                result: s,
                backend: self.backend,
                attempts: self.attempts,
            },
            DispatchResult::Response(_) => unreachable!("response outcome requested as stream"),
        }
    }
}

async fn dispatch_parallel_fallback(
    router: &Router,
    request: Request,
    preferred_backend: Option<&str>,
    streaming: bool,
) -> GatewayResult<DispatchOutcomeEither> {
    let healthy = router.registry.healthy_names(&router.config);
    let candidates: Vec<String> = if let Some(name) = preferred_backend {
        std::iter::once(name.to_string())
            .chain(healthy.into_iter().filter(|n| n != name))
            .collect()
    } else {
        healthy
    };
    if candidates.is_empty() {
        return Err(GatewayError::no_backend_available(
            "no healthy backend available for parallel fallback",
        ));
    }

    for name in &candidates {
        router.emit(RouterEvent::Selected { name: name.clone() });
    }

    let mut futs = FuturesUnordered::new();
    for name in candidates.iter().cloned() {
        let adapter = router
            .registry
            .adapter(&name)
            .ok_or_else(|| GatewayError::no_backend_available(name.clone()))?;
        let req = request.clone();
        futs.push(async move {
            let start = Instant::now();
            let result = if streaming {
                adapter.execute_stream(req).await.map(DispatchResult::Stream)
            } else {
                adapter.execute(req).await.map(DispatchResult::Response)
            };
            (name, result, start.elapsed().as_millis() as u64)
        });
    }

    let mut attempts = Vec::new();
    let mut last_error = None;
    while let Some((name, result, latency_ms)) = futs.next().await {
        match result {
            Ok(result) => {
                router.registry.record_success(&name, latency_ms);
                attempts.push(Attempt {
                    backend: name.clone(),
                    error: None,
                    latency_ms,
                });
                // Dropping `futs` here cancels every still-running peer.
                return Ok(DispatchOutcomeEither {
                    result,
                    backend: name,
                    attempts,
                });
            }
            Err(err) => {
                router.registry.record_failure(&name, &router.config, latency_ms);
                attempts.push(Attempt {
                    backend: name.clone(),
                    error: Some(err.to_string()),
                    latency_ms,
                });
                last_error = Some(err);
            }
        }
    }

    let attempted: Vec<String> = attempts.iter().map(|a| a.backend.clone()).collect();
    Err(GatewayError::all_backends_failed(
        &attempted,
        last_error.unwrap_or_else(|| GatewayError::no_backend_available("no candidates")),
    ))
}

// ---------------------------------------------------------------------
// dispatchParallel: explicit fan-out, distinct from fallback
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStrategy {
    First,
    All,
    Fastest,
    Custom,
}

pub type CustomAggregatorFn =
    Arc<dyn Fn(&[BackendAttemptResult]) -> GatewayResult<Response> + Send + Sync>;

#[derive(Clone)]
pub struct ParallelDispatchOptions {
    pub backends: Option<Vec<String>>,
    pub strategy: AggregationStrategy,
    /// Defaults to `false` for `all` (every backend's answer is the point
    /// of asking for `all`) and `true` for `first`/`fastest` — see
    /// DESIGN.md for the reasoning.
    pub cancel_on_first_success: bool,
    pub timeout: Option<Duration>,
    pub aggregator: Option<CustomAggregatorFn>,
}

impl std::fmt::Debug for ParallelDispatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelDispatchOptions")
            .field("backends", &self.backends)
            .field("strategy", &self.strategy)
            .field("cancel_on_first_success", &self.cancel_on_first_success)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ParallelDispatchOptions {
    fn default() -> Self {
        Self {
            backends: None,
            strategy: AggregationStrategy::First,
            cancel_on_first_success: true,
            timeout: None,
            aggregator: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendAttemptResult {
    pub backend: String,
    pub response: Option<Response>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug)]
pub struct ParallelDispatchResult {
    pub response: Option<Response>,
    pub all_responses: Vec<BackendAttemptResult>,
    pub successful_backends: Vec<String>,
    pub failed_backends: Vec<String>,
    pub total_time_ms: u64,
}

pub async fn dispatch_parallel(
    router: &Router,
    request: Request,
    options: ParallelDispatchOptions,
) -> GatewayResult<ParallelDispatchResult> {
    let targets = options
        .backends
        .clone()
        .unwrap_or_else(|| router.registry.names());
    if targets.is_empty() {
        return Err(GatewayError::no_backend_available(
            "dispatch_parallel called with no backends",
        ));
    }

    let overall_start = Instant::now();
    let run_one = |name: String| {
        let adapter = router.registry.adapter(&name);
        let req = request.clone();
        async move {
            let start = Instant::now();
            let adapter = match adapter {
                Some(a) => a,
                None => {
                    return BackendAttemptResult {
                        backend: name,
                        response: None,
                        error: Some("backend not registered".to_string()),
                        latency_ms: 0,
                    }
                }
            };
            let result = adapter.execute(req).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            match result {
                Ok(response) => BackendAttemptResult {
                    backend: name,
                    response: Some(response),
                    error: None,
                    latency_ms,
                },
                Err(err) => BackendAttemptResult {
                    backend: name,
                    response: None,
                    error: Some(err.to_string()),
                    latency_ms,
                },
            }
        }
    };

    let mut all_responses = match options.strategy {
        AggregationStrategy::All => {
            let mut futs = FuturesUnordered::new();
            for name in targets {
                futs.push(run_one(name));
            }
            let mut results = Vec::new();
            while let Some(r) = futs.next().await {
                results.push(r);
            }
            results
        }
        AggregationStrategy::First | AggregationStrategy::Fastest | AggregationStrategy::Custom => {
            let mut futs = FuturesUnordered::new();
            for name in targets {
                futs.push(run_one(name));
            }
            let fut = async {
                let mut results = Vec::new();
                while let Some(r) = futs.next().await {
                    let is_success = r.response.is_some();
                    results.push(r);
                    if is_success && options.cancel_on_first_success {
                        break;
                    }
                }
                results
            };
            match options.timeout {
                Some(timeout) if options.strategy == AggregationStrategy::Fastest => {
                    tokio::time::timeout(timeout, fut).await.unwrap_or_default()
                }
                _ => fut.await,
            }
        }
    };

    all_responses.sort_by(|a, b| a.backend.cmp(&b.backend));

    let successful_backends: Vec<String> = all_responses
        .iter()
        .filter(|r| r.response.is_some())
        .map(|r| r.backend.clone())
        .collect();
    let failed_backends: Vec<String> = all_responses
        .iter()
        .filter(|r| r.response.is_none())
        .map(|r| r.backend.clone())
        .collect();

    let response = match options.strategy {
        AggregationStrategy::Custom => {
            let aggregator = options.aggregator.ok_or_else(|| {
                GatewayError::invalid_request("custom aggregation strategy requires an aggregator")
            })?;
            Some(aggregator(&all_responses)?)
        }
        _ => all_responses
            .iter()
            .find(|r| r.response.is_some())
            .and_then(|r| r.response.clone()),
    };

    Ok(ParallelDispatchResult {
        response,
        all_responses,
        successful_backends,
        failed_backends,
        total_time_ms: overall_start.elapsed().as_millis() as u64,
    })
}

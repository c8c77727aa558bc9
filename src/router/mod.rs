//! The Router: a backend target that multiplexes across many backends with
//! routing policy, fallback, circuit breaking, health probing, and parallel
//! dispatch.
//!
//! A `DashMap`-backed registry with lock-free reads and round-robin counters
//! scoped per router instance, not process-wide globals, so two routers in
//! the same process don't perturb each other's load balancing. Built around
//! the IR's [`BackendAdapter`] trait so a backend is a backend whether it's a
//! single provider or a nested pool, with circuit breaking and fallback
//! wired directly into the selection path rather than left as separate,
//! uncoordinated pieces.

mod circuit_breaker;
mod config;
mod dispatch;
mod events;
mod registry;
mod selection;

pub use circuit_breaker::CircuitState;
pub use config::{FallbackStrategy, ModelPatternEntry, RouterConfig, RoutingStrategy};
pub use dispatch::{AggregationStrategy, ParallelDispatchOptions, ParallelDispatchResult};
pub use events::RouterEvent;
pub use registry::BackendInfo;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backends::{BackendAdapter, ChunkStream, ModelListResult};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{Capabilities, Request, Response, SystemMessageStrategy};
use registry::Registry;

/// A pool of backends behind one routing policy. Implements
/// [`BackendAdapter`] itself, so a Bridge — or another Router, for tiered
/// routing — can hold it exactly like a single concrete backend.
#[derive(Debug)]
pub struct Router {
    registry: Registry,
    config: RouterConfig,
    events_tx: broadcast::Sender<RouterEvent>,
    health_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    capabilities: Capabilities,
}

impl Router {
    pub fn new(config: RouterConfig) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        let router = Arc::new(Self {
            registry: Registry::new(),
            config,
            events_tx,
            health_task: std::sync::Mutex::new(None),
            capabilities: Capabilities::minimal(SystemMessageStrategy::InMessages),
        });
        if router.config.health_check_interval > std::time::Duration::ZERO {
            router.clone().spawn_health_probe();
        }
        router
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: RouterEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Registers a backend under `name`. Registry mutation is serialized by
    /// a single router-wide lock internally; per-backend stats and circuit
    /// state live in fine-grained entries so the provider call itself never
    /// holds that lock.
    pub fn register(&self, name: impl Into<String>, adapter: Arc<dyn BackendAdapter>) {
        self.registry.register(name.into(), adapter);
    }

    /// Registers a backend with a load-balancing `weight` hint, surfaced on
    /// [`BackendInfo::weight`].
    pub fn register_with_weight(&self, name: impl Into<String>, adapter: Arc<dyn BackendAdapter>, weight: f64) {
        self.registry.register_with_weight(name.into(), adapter, weight);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn backend_info(&self, name: &str) -> Option<BackendInfo> {
        self.registry.info(name, &self.config)
    }

    pub fn all_backend_info(&self) -> Vec<BackendInfo> {
        self.registry
            .names()
            .into_iter()
            .filter_map(|n| self.registry.info(&n, &self.config))
            .collect()
    }

    /// Circuit breaker manual overrides.
    pub fn open_circuit_breaker(&self, name: &str, timeout: Option<std::time::Duration>) {
        self.registry
            .open_circuit(name, timeout.unwrap_or(self.config.circuit_breaker_timeout));
    }

    pub fn close_circuit_breaker(&self, name: &str) {
        self.registry.close_circuit(name);
    }

    pub fn reset_circuit_breaker(&self, name: Option<&str>) {
        match name {
            Some(n) => self.registry.reset_circuit(n),
            None => {
                for n in self.registry.names() {
                    self.registry.reset_circuit(&n);
                }
            }
        }
    }

    /// Selects a backend name for `request` per the configured
    /// [`RoutingStrategy`]. The selected backend must be healthy and not
    /// circuit-open, or selection fails with `no_backend_available`.
    pub async fn select_backend(
        &self,
        request: &Request,
        preferred_backend: Option<&str>,
    ) -> GatewayResult<String> {
        selection::select(&self.registry, &self.config, request, preferred_backend).await
    }

    /// Dispatches with the configured fallback policy, returning the
    /// winning response plus bookkeeping the Bridge turns into events and
    /// stats.
    pub async fn dispatch(
        &self,
        request: Request,
        preferred_backend: Option<&str>,
    ) -> GatewayResult<dispatch::DispatchOutcome<Response>> {
        dispatch::dispatch_sequential(self, request, preferred_backend, false)
            .await
            .map(dispatch::DispatchOutcomeEither::map)
    }

    pub async fn dispatch_stream(
        &self,
        request: Request,
        preferred_backend: Option<&str>,
    ) -> GatewayResult<dispatch::DispatchOutcome<ChunkStream>> {
        dispatch::dispatch_sequential(self, request, preferred_backend, true)
            .await
            .map(dispatch::DispatchOutcomeEither::map_stream)
    }

    /// Fans a request out to multiple backends at once, distinct from the
    /// `parallel` *fallback* strategy used by [`Router::dispatch`].
    pub async fn dispatch_parallel(
        &self,
        request: Request,
        options: ParallelDispatchOptions,
    ) -> GatewayResult<ParallelDispatchResult> {
        dispatch::dispatch_parallel(self, request, options).await
    }

    fn spawn_health_probe(self: Arc<Self>) {
        let interval = self.config.health_check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let names = self.registry.names();
                for name in names {
                    if let Some(adapter) = self.registry.adapter(&name) {
                        let healthy = tokio::time::timeout(
                            self.config.health_check_timeout,
                            adapter.health_check(),
                        )
                        .await
                        .unwrap_or(false);
                        self.registry.set_health(&name, healthy);
                        self.emit(RouterEvent::Health {
                            name: name.clone(),
                            healthy,
                        });
                    }
                }
            }
        });
        *self.health_task.lock().unwrap() = Some(handle);
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Some(handle) = self.health_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl BackendAdapter for Router {
    fn name(&self) -> &str {
        "router"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn execute(&self, request: Request) -> GatewayResult<Response> {
        let preferred = request
            .metadata
            .custom
            .get("preferred_backend")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        self.dispatch(request, preferred.as_deref())
            .await
            .map(|outcome| outcome.result)
    }

    async fn execute_stream(&self, request: Request) -> GatewayResult<ChunkStream> {
        let preferred = request
            .metadata
            .custom
            .get("preferred_backend")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        self.dispatch_stream(request, preferred.as_deref())
            .await
            .map(|outcome| outcome.result)
    }

    async fn health_check(&self) -> bool {
        self.registry.names().iter().any(|n| {
            self.registry
                .info(n, &self.config)
                .map(|i| i.is_healthy)
                .unwrap_or(false)
        })
    }

    async fn list_models(&self) -> GatewayResult<ModelListResult> {
        Err(GatewayError::unsupported_feature(
            "list_models is not aggregated across a router; call it on a specific backend",
        ))
    }
}

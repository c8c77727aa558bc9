//! The Bridge: a single frontend wired to one backend target (a concrete
//! backend or a [`crate::router::Router`]), plus the middleware stack, event
//! bus, and statistics that sit around every request.

mod config;
mod events;
mod stats;

pub use config::BridgeConfig;
pub use events::BridgeEvent;
pub use stats::{BridgeStatsSnapshot, LatencyPercentiles, Stats};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::backends::{BackendAdapter, ChunkStream};
use crate::error::{GatewayError, GatewayResult};
use crate::frontends::{DialectStream, FrontendAdapter};
use crate::ir::{Request, Response, StreamChunk};
use crate::middleware::{AnyMiddleware, MiddlewareStack, RequestContext, StreamContext};
use crate::streaming::Cancellation;

/// Per-call overrides to the Bridge's defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub cancellation: Option<Cancellation>,
    /// Forwarded to the backend target as `metadata.custom["preferred_backend"]`;
    /// meaningful when the target is a [`crate::router::Router`], ignored by a
    /// single fixed backend.
    pub backend: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub skip_middleware: bool,
    pub custom: HashMap<String, Value>,
}

/// Wires one [`FrontendAdapter`] to one backend target, running every
/// request through the registered middleware chain and publishing lifecycle
/// events and statistics along the way.
///
/// Generic over `F` rather than holding `Arc<dyn FrontendAdapter>`: each
/// Bridge speaks exactly one dialect, so its `chat`/`chat_stream` methods can
/// be typed in terms of `F::DialectRequest`/`F::DialectResponse` instead of
/// an untyped envelope, the same way for every frontend.
pub struct Bridge<F: FrontendAdapter> {
    frontend: F,
    backend_target: Arc<dyn BackendAdapter>,
    /// Set only when this Bridge was built via [`Bridge::with_router`], so
    /// `router()` can hand back a typed handle without an `Any` downcast.
    router: Option<Arc<crate::router::Router>>,
    middleware: RwLock<MiddlewareStack>,
    config: Arc<BridgeConfig>,
    events_tx: broadcast::Sender<BridgeEvent>,
    stats: Arc<Stats>,
}

impl<F: FrontendAdapter> std::fmt::Debug for Bridge<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("frontend", &self.frontend.name())
            .field("backend_target", &self.backend_target.name())
            .field("config", &self.config)
            .finish()
    }
}

impl<F: FrontendAdapter> Bridge<F> {
    pub fn new(frontend: F, backend_target: Arc<dyn BackendAdapter>, config: BridgeConfig) -> GatewayResult<Self> {
        Self::build(frontend, backend_target, None, config)
    }

    /// Builds a Bridge over a [`crate::router::Router`] backend target,
    /// keeping a typed handle so [`Bridge::router`] can return it directly.
    pub fn with_router(frontend: F, router: Arc<crate::router::Router>, config: BridgeConfig) -> GatewayResult<Self> {
        let backend_target: Arc<dyn BackendAdapter> = router.clone();
        Self::build(frontend, backend_target, Some(router), config)
    }

    fn build(
        frontend: F,
        backend_target: Arc<dyn BackendAdapter>,
        router: Option<Arc<crate::router::Router>>,
        config: BridgeConfig,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (events_tx, _) = broadcast::channel(256);
        Ok(Self {
            stats: Arc::new(Stats::new(config.latency_sample_cap)),
            frontend,
            backend_target,
            router,
            middleware: RwLock::new(MiddlewareStack::new()),
            config,
            events_tx,
        })
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    /// Returns the backend target as a [`crate::router::Router`], if this
    /// Bridge was built via [`Bridge::with_router`].
    pub fn router(&self) -> Option<Arc<crate::router::Router>> {
        self.router.clone()
    }

    pub fn use_middleware(&self, middleware: Arc<dyn AnyMiddleware>) {
        self.middleware.write().unwrap().add(middleware);
    }

    pub fn remove_middleware(&self, name: &str) -> bool {
        self.middleware.write().unwrap().remove(name)
    }

    pub fn clear_middleware(&self) {
        self.middleware.write().unwrap().clear();
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.middleware.read().unwrap().names()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    fn build_ir(&self, dialect_request: F::DialectRequest, options: &RequestOptions) -> GatewayResult<Request> {
        self.frontend.validate(&dialect_request)?;
        let mut request = self.frontend.to_ir(dialect_request)?;
        if self.config.auto_request_id {
            if let Some(id) = options.metadata.get("request_id").and_then(Value::as_str) {
                request.metadata.request_id = id.to_string();
            }
        }
        for (k, v) in &options.metadata {
            request.metadata.custom.insert(k.clone(), v.clone());
        }
        for (k, v) in &options.custom {
            request.metadata.custom.insert(k.clone(), v.clone());
        }
        if let Some(backend) = &options.backend {
            request
                .metadata
                .custom
                .insert("preferred_backend".to_string(), Value::from(backend.clone()));
        }
        if options.skip_middleware {
            request
                .metadata
                .custom
                .insert("skip_middleware".to_string(), Value::Bool(true));
        }
        Ok(request)
    }

    /// Non-streaming request/response cycle: build IR, run the
    /// middleware chain, dispatch to the backend target, translate back.
    pub async fn chat(
        &self,
        dialect_request: F::DialectRequest,
        options: RequestOptions,
    ) -> GatewayResult<F::DialectResponse> {
        let request = self.build_ir(dialect_request, &options)?;
        let request_id = request.metadata.request_id.clone();
        let cancellation = options.cancellation.clone().unwrap_or_default();
        let timeout = options.timeout.or(self.config.default_timeout);

        self.emit(BridgeEvent::RequestStart {
            request_id: request_id.clone(),
        });
        let started = Instant::now();

        let result = self.run_chat(request, cancellation, timeout).await;

        match &result {
            Ok(response) => {
                let latency = started.elapsed().as_millis() as u64;
                self.stats.record_success(response.metadata.provenance.backend.as_deref(), latency);
                self.emit(BridgeEvent::RequestSuccess {
                    request_id: request_id.clone(),
                    duration_ms: latency,
                });
            }
            Err(err) => {
                self.stats.record_failure(&err.code.to_string());
                self.emit(BridgeEvent::RequestError {
                    request_id: request_id.clone(),
                    error: Arc::new(clone_error(err)),
                });
            }
        }

        let response = result?;
        self.frontend.from_ir(response)
    }

    async fn run_chat(
        &self,
        request: Request,
        cancellation: Cancellation,
        timeout: Option<Duration>,
    ) -> GatewayResult<Response> {
        let context = RequestContext::new(request, cancellation, self.config.clone());
        let stack = self.middleware.read().unwrap();
        let backend_target = self.backend_target.clone();
        let terminal = move |ctx: RequestContext| -> crate::middleware::BoxFuture<'static, GatewayResult<Response>> {
            let backend_target = backend_target.clone();
            Box::pin(async move { backend_target.execute(ctx.request).await })
        };
        let run = stack.run(context, None, &terminal);
        match timeout {
            Some(d) => tokio::time::timeout(d, run)
                .await
                .unwrap_or_else(|_| Err(GatewayError::new(crate::error::ErrorCode::ProviderTimeout, "request timed out"))),
            None => run.await,
        }
    }

    /// Streaming request/response cycle.
    pub async fn chat_stream(
        &self,
        dialect_request: F::DialectRequest,
        options: RequestOptions,
    ) -> GatewayResult<DialectStream<F::DialectStreamItem>> {
        let request = self.build_ir(dialect_request, &options)?;
        let request_id = request.metadata.request_id.clone();
        let cancellation = options.cancellation.clone().unwrap_or_default();

        self.stats.record_streaming();
        self.emit(BridgeEvent::StreamStart {
            request_id: request_id.clone(),
        });
        let started = Instant::now();

        let context = RequestContext::new(request, cancellation.clone(), self.config.clone())
            .into_stream_context();
        let backend_target = self.backend_target.clone();

        let inner = {
            let stack = self.middleware.read().unwrap();
            let terminal = move |ctx: StreamContext| -> crate::middleware::BoxFuture<'static, GatewayResult<ChunkStream>> {
                let backend_target = backend_target.clone();
                Box::pin(async move { backend_target.execute_stream(ctx.request).await })
            };
            stack.run_stream(context, None, &terminal).await
        };

        let stream = match inner {
            Ok(stream) => stream,
            Err(err) => {
                self.emit(BridgeEvent::StreamError {
                    request_id: request_id.clone(),
                    error: Arc::new(clone_error(&err)),
                });
                return Err(err);
            }
        };

        Ok(self.wrap_dialect_stream(stream, request_id, started))
    }

    fn wrap_dialect_stream(
        &self,
        stream: ChunkStream,
        request_id: String,
        started: Instant,
    ) -> DialectStream<F::DialectStreamItem> {
        use futures::StreamExt;

        let events_tx = self.events_tx.clone();
        let stats = self.stats.clone();
        let sequence = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let observed = stream.map(move |item| {
            if item.is_ok() {
                let seq = sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let _ = events_tx.send(BridgeEvent::StreamChunk {
                    request_id: request_id.clone(),
                    sequence: seq,
                });
            }
            match &item {
                Ok(StreamChunk::Done { .. }) => {
                    let latency = started.elapsed().as_millis() as u64;
                    stats.record_success(None, latency);
                    let _ = events_tx.send(BridgeEvent::StreamComplete {
                        request_id: request_id.clone(),
                        duration_ms: latency,
                    });
                }
                Err(err) => {
                    stats.record_failure(&err.code.to_string());
                    let _ = events_tx.send(BridgeEvent::StreamError {
                        request_id: request_id.clone(),
                        error: Arc::new(clone_error(err)),
                    });
                }
                _ => {}
            }
            item
        });

        self.frontend.from_ir_stream(Box::pin(observed))
    }

    /// Returns a new Bridge over the same frontend dialect and backend
    /// target with different configuration, sharing neither stats nor
    /// subscribers with the original.
    pub fn with_config(&self, config: BridgeConfig) -> GatewayResult<Self>
    where
        F: Clone,
    {
        Self::build(self.frontend.clone(), self.backend_target.clone(), self.router.clone(), config)
    }
}

fn clone_error(err: &GatewayError) -> GatewayError {
    GatewayError::new(err.code, err.message.clone())
        .with_provenance(err.provenance.clone())
        .with_retryable(err.is_retryable)
}

impl RequestContext {
    fn into_stream_context(self) -> StreamContext {
        let mut ctx = StreamContext::new(self.request, self.cancellation, self.config);
        if let Some(backend) = self.backend().cloned() {
            ctx.set_backend(backend);
        }
        ctx
    }
}

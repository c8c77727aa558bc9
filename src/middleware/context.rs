//! Per-request middleware context.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::backends::BackendAdapter;
use crate::bridge::BridgeConfig;
use crate::ir::Request;
use crate::streaming::Cancellation;

/// A shared, string-keyed bag middleware use to pass values downstream
/// (e.g. a caching middleware stashing a cache key for a later middleware
/// to read on the way back out). Cloning a `SharedState` clones the `Arc`,
/// not the map — every middleware invocation for one request sees the same
/// underlying map.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<DashMap<String, Value>>);

impl SharedState {
    pub fn new() -> Self {
        Self(Arc::new(DashMap::new()))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }
}

/// Context passed through the non-streaming middleware chain.
///
/// `request` is owned, not borrowed: middleware that needs to change it
/// replaces the field wholesale rather than editing through a `&mut`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request: Request,
    backend: Option<Arc<dyn BackendAdapter>>,
    pub cancellation: Cancellation,
    pub state: SharedState,
    pub config: Arc<BridgeConfig>,
}

impl RequestContext {
    pub fn new(
        request: Request,
        cancellation: Cancellation,
        config: Arc<BridgeConfig>,
    ) -> Self {
        Self {
            request,
            backend: None,
            cancellation,
            state: SharedState::new(),
            config,
        }
    }

    pub fn backend(&self) -> Option<&Arc<dyn BackendAdapter>> {
        self.backend.as_ref()
    }

    /// Populated by the Router (or directly by the Bridge for a single
    /// fixed backend) once selection has happened.
    pub fn set_backend(&mut self, backend: Arc<dyn BackendAdapter>) {
        self.backend = Some(backend);
    }
}

/// Streaming counterpart of [`RequestContext`]. Kept as a distinct type
/// rather than a generic `Context<R>` because the terminal call shape
/// differs (`execute_stream` vs `execute`).
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub request: Request,
    backend: Option<Arc<dyn BackendAdapter>>,
    pub cancellation: Cancellation,
    pub state: SharedState,
    pub config: Arc<BridgeConfig>,
}

impl StreamContext {
    pub fn new(
        request: Request,
        cancellation: Cancellation,
        config: Arc<BridgeConfig>,
    ) -> Self {
        Self {
            request,
            backend: None,
            cancellation,
            state: SharedState::new(),
            config,
        }
    }

    pub fn backend(&self) -> Option<&Arc<dyn BackendAdapter>> {
        self.backend.as_ref()
    }

    pub fn set_backend(&mut self, backend: Arc<dyn BackendAdapter>) {
        self.backend = Some(backend);
    }
}

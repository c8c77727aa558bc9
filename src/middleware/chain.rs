//! The `next`-continuation chain itself.
//!
//! `Next`/`StreamNext` wrap an index into an immutable middleware vector
//! plus a per-invocation "already called" flag (an `Arc<AtomicBool>`, since
//! double-invoking `next` must be *detectably* wrong at runtime, raised as
//! a `middleware_error` rather than statically prevented by ownership).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::context::{RequestContext, StreamContext};
use super::{RequestMiddleware, StreamMiddleware};
use crate::backends::ChunkStream;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::Response;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Either a user-registered request middleware, or a streaming-only one.
/// Most registrations provide both halves; see [`MiddlewareEntry`].
pub trait AnyMiddleware: RequestMiddleware + StreamMiddleware {}
impl<T: RequestMiddleware + StreamMiddleware> AnyMiddleware for T {}

/// A backend call, selection step, or frontend conversion the chain's
/// terminal position invokes once every middleware has run. Boxed so the
/// Bridge can close over whatever router/backend/frontend state it needs
/// without the chain knowing about those types.
pub type Terminal<'a, C, T> = dyn Fn(C) -> BoxFuture<'a, GatewayResult<T>> + Send + Sync + 'a;

/// Runs before the first non-`run_before_routing` middleware, populating
/// `context.backend()`. `None` when the Bridge targets a single fixed
/// backend that's already set on the context before the chain starts.
pub type Selector<'a> = dyn Fn(&mut RequestContext) -> GatewayResult<()> + Send + Sync + 'a;
pub type StreamSelector<'a> = dyn Fn(&mut StreamContext) -> GatewayResult<()> + Send + Sync + 'a;

/// An ordered, immutable (per-call) list of middleware. The Bridge owns a
/// `Vec<Arc<dyn AnyMiddleware>>` it can `use`/`remove`/`clear` between
/// calls; each individual `chat`/`chat_stream` invocation borrows a
/// consistent snapshot via `&self` for the duration of one request, so
/// concurrent requests never see a chain mutated out from under them.
#[derive(Default)]
pub struct MiddlewareStack {
    middlewares: Vec<Arc<dyn AnyMiddleware>>,
}

impl std::fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("names", &self.names())
            .finish()
    }
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: Arc<dyn AnyMiddleware>) {
        self.middlewares.push(middleware);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.middlewares.len();
        self.middlewares.retain(|m| m.name() != name);
        self.middlewares.len() != before
    }

    pub fn clear(&mut self) {
        self.middlewares.clear();
    }

    pub fn names(&self) -> Vec<String> {
        self.middlewares.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs the request-phase chain. `selector` is invoked exactly once,
    /// right before the first middleware that is not flagged
    /// `run_before_routing`: middleware ordered earlier but not so flagged
    /// still runs *after* selection, since "runs before routing" is a
    /// per-middleware opt-in, not a reordering of the list.
    pub async fn run<'a>(
        &'a self,
        mut context: RequestContext,
        selector: Option<&'a Selector<'a>>,
        terminal: &'a Terminal<'a, RequestContext, Response>,
    ) -> GatewayResult<Response> {
        if context.request.metadata.custom.get("skip_middleware").is_some() {
            return terminal(context).await;
        }
        let mut selected = context.backend().is_some();
        if !selected && self.middlewares.iter().all(|m| m.run_before_routing()) {
            if let Some(selector) = selector {
                selector(&mut context)?;
                selected = true;
            }
        }
        let next = Next {
            stack: self,
            index: 0,
            selector,
            selected_flag: Arc::new(AtomicBool::new(selected)),
            terminal,
            invoked: Arc::new(AtomicBool::new(false)),
        };
        next.run(context).await
    }

    pub async fn run_stream<'a>(
        &'a self,
        mut context: StreamContext,
        selector: Option<&'a StreamSelector<'a>>,
        terminal: &'a Terminal<'a, StreamContext, ChunkStream>,
    ) -> GatewayResult<ChunkStream> {
        if context.request.metadata.custom.get("skip_middleware").is_some() {
            return terminal(context).await;
        }
        let mut selected = context.backend().is_some();
        if !selected && self.middlewares.iter().all(|m| m.run_before_routing()) {
            if let Some(selector) = selector {
                selector(&mut context)?;
                selected = true;
            }
        }
        let next = StreamNext {
            stack: self,
            index: 0,
            selector,
            selected_flag: Arc::new(AtomicBool::new(selected)),
            terminal,
            invoked: Arc::new(AtomicBool::new(false)),
        };
        next.run(context).await
    }
}

/// The continuation passed to each middleware. Cloneable (cheaply — it's a
/// handful of `Arc`s and a `usize`), but each clone shares the same
/// `invoked` flag as the original, so a middleware that stashes `next` and
/// calls it twice (directly, or via a clone) still trips the at-most-once
/// rule.
pub struct Next<'a> {
    stack: &'a MiddlewareStack,
    index: usize,
    selector: Option<&'a Selector<'a>>,
    selected_flag: Arc<AtomicBool>,
    terminal: &'a Terminal<'a, RequestContext, Response>,
    invoked: Arc<AtomicBool>,
}

impl<'a> Next<'a> {
    pub async fn run(&self, mut context: RequestContext) -> GatewayResult<Response> {
        if self.invoked.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::middleware_error(
                "next() invoked more than once by the same middleware",
            ));
        }

        match self.stack.middlewares.get(self.index) {
            None => (self.terminal)(context).await,
            Some(mw) => {
                if !mw.run_before_routing() && !self.selected_flag.load(Ordering::SeqCst) {
                    if let Some(selector) = self.selector {
                        selector(&mut context)?;
                    }
                    self.selected_flag.store(true, Ordering::SeqCst);
                }
                let next = Next {
                    stack: self.stack,
                    index: self.index + 1,
                    selector: self.selector,
                    selected_flag: self.selected_flag.clone(),
                    terminal: self.terminal,
                    invoked: Arc::new(AtomicBool::new(false)),
                };
                mw.handle(context, next).await
            }
        }
    }
}

pub struct StreamNext<'a> {
    stack: &'a MiddlewareStack,
    index: usize,
    selector: Option<&'a StreamSelector<'a>>,
    selected_flag: Arc<AtomicBool>,
    terminal: &'a Terminal<'a, StreamContext, ChunkStream>,
    invoked: Arc<AtomicBool>,
}

impl<'a> StreamNext<'a> {
    pub async fn run(&self, mut context: StreamContext) -> GatewayResult<ChunkStream> {
        if self.invoked.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::middleware_error(
                "next() invoked more than once by the same middleware",
            ));
        }

        match self.stack.middlewares.get(self.index) {
            None => (self.terminal)(context).await,
            Some(mw) => {
                if !mw.run_before_routing() && !self.selected_flag.load(Ordering::SeqCst) {
                    if let Some(selector) = self.selector {
                        selector(&mut context)?;
                    }
                    self.selected_flag.store(true, Ordering::SeqCst);
                }
                let next = StreamNext {
                    stack: self.stack,
                    index: self.index + 1,
                    selector: self.selector,
                    selected_flag: self.selected_flag.clone(),
                    terminal: self.terminal,
                    invoked: Arc::new(AtomicBool::new(false)),
                };
                mw.handle_stream(context, next).await
            }
        }
    }
}

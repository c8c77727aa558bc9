//! Middleware stack.
//!
//! A `process(context, next)` call per middleware, but `next` is resolved
//! with an index into an immutable middleware vector instead of a closure
//! capturing the rest of the chain: a `FnOnce` handler can't satisfy a trait
//! method callable more than once, so `next` is just "run the middleware at
//! `index + 1`, or the terminal backend call if none remain" — callable
//! exactly once per invocation, and cheaply re-enterable at a different
//! index for each middleware in the chain.

mod chain;
mod context;

pub use chain::{AnyMiddleware, BoxFuture, MiddlewareStack, Next, StreamNext};
pub use context::{RequestContext, StreamContext};

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::ir::{Request, Response};

/// A request/response middleware. Streaming middleware lives on
/// [`StreamMiddleware`]; most middleware only needs the non-streaming form
/// and can implement both by delegating (see [`chain::passthrough_stream`]).
#[async_trait]
pub trait RequestMiddleware: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// If true, this middleware runs before backend selection — it sees
    /// `context.backend()` as `None`.
    fn run_before_routing(&self) -> bool {
        false
    }

    async fn handle(&self, context: RequestContext, next: Next<'_>) -> GatewayResult<Response>;
}

/// The streaming counterpart: produces a chunk stream instead of a single
/// response, wrapping the inner stream if it needs to observe or transform
/// chunks in flight.
#[async_trait]
pub trait StreamMiddleware: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn run_before_routing(&self) -> bool {
        false
    }

    async fn handle_stream(
        &self,
        context: StreamContext,
        next: StreamNext<'_>,
    ) -> GatewayResult<crate::backends::ChunkStream>;
}

pub(crate) fn validate_request(request: &Request) -> GatewayResult<()> {
    if request.messages.is_empty() {
        return Err(crate::error::GatewayError::invalid_request(
            "request must contain at least one message",
        ));
    }
    Ok(())
}

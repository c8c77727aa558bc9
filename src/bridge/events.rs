//! Bridge lifecycle events, published for subscribers via a broadcast channel.

use std::sync::Arc;

use crate::error::GatewayError;

/// A single subscribable Bridge lifecycle event. Carries only plain data
/// (no `Response`/`Request` borrows) so subscribers can hold it across
/// `await` points freely, matching `tokio::sync::broadcast`'s `Clone`
/// requirement.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    RequestStart {
        request_id: String,
    },
    RequestSuccess {
        request_id: String,
        duration_ms: u64,
    },
    RequestError {
        request_id: String,
        error: Arc<GatewayError>,
    },
    StreamStart {
        request_id: String,
    },
    StreamChunk {
        request_id: String,
        sequence: u64,
    },
    StreamComplete {
        request_id: String,
        duration_ms: u64,
    },
    StreamError {
        request_id: String,
        error: Arc<GatewayError>,
    },
}

impl BridgeEvent {
    pub fn request_id(&self) -> &str {
        match self {
            BridgeEvent::RequestStart { request_id }
            | BridgeEvent::RequestSuccess { request_id, .. }
            | BridgeEvent::RequestError { request_id, .. }
            | BridgeEvent::StreamStart { request_id }
            | BridgeEvent::StreamChunk { request_id, .. }
            | BridgeEvent::StreamComplete { request_id, .. }
            | BridgeEvent::StreamError { request_id, .. } => request_id,
        }
    }
}

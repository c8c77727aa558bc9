//! Frontend adapters: dialect ↔ IR.
//!
//! Each dialect is generic over its own native request/response/stream-item
//! types rather than forced through a single untyped envelope — associated
//! types, not a string-keyed map, at the caller boundary.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;

use crate::backends::ChunkStream;
use crate::error::GatewayResult;
use crate::ir::{Request, Response};

pub type DialectStream<T> = Pin<Box<dyn Stream<Item = GatewayResult<T>> + Send>>;

/// Converts one provider dialect's native request/response/stream shapes
/// to and from the IR.
///
/// `to_ir`/`from_ir` are pure and synchronous-compatible (no I/O), matching
/// the backend side's `transform_request`/`transform_response` split so
/// both halves of the pipeline can be unit tested the same way.
#[async_trait]
pub trait FrontendAdapter: Send + Sync + Debug + 'static {
    type DialectRequest: Send;
    type DialectResponse: Send;
    type DialectStreamItem: Send + 'static;

    fn name(&self) -> &str;

    /// Dialect request → IR. Fails with `invalid_request` /
    /// `invalid_message_format` when the payload is malformed.
    fn to_ir(&self, request: Self::DialectRequest) -> GatewayResult<Request>;

    /// IR response → dialect response. Fails with
    /// `adapter_conversion_error` on unrepresentable IR values.
    fn from_ir(&self, response: Response) -> GatewayResult<Self::DialectResponse>;

    /// IR chunk stream → dialect-native stream-item stream. Lazy, finite,
    /// not restartable, mirroring the IR stream it wraps.
    fn from_ir_stream(&self, stream: ChunkStream) -> DialectStream<Self::DialectStreamItem>;

    /// Optional pre-`to_ir` rejection. Default: accept everything.
    fn validate(&self, _request: &Self::DialectRequest) -> GatewayResult<()> {
        Ok(())
    }
}

//! Shared test double: a `BackendAdapter` that returns a scripted sequence of
//! outcomes instead of making a provider call, so Router/Bridge-level tests
//! can drive fallback, circuit-breaker, and streaming behavior deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use gatewayrs::backends::{BackendAdapter, ChunkStream};
use gatewayrs::error::{GatewayError, GatewayResult};
use gatewayrs::ir::{
    Capabilities, FinishReason, Message, Metadata, Request, Response, StreamChunk,
    SystemMessageStrategy, TokenUsage,
};

/// One scripted outcome for a single `execute`/`execute_stream` call.
pub enum Step {
    Ok(Response),
    Err(GatewayError),
    Stream(Vec<GatewayResult<StreamChunk>>),
    StreamErr(GatewayError),
}

/// A `BackendAdapter` driven by a queue of [`Step`]s, consumed in order. Once
/// the queue is empty, every further call returns `no_backend_available` so a
/// test that under-counts its script fails loudly instead of hanging.
#[derive(Debug)]
pub struct FakeBackend {
    name: String,
    capabilities: Capabilities,
    queue: Mutex<VecDeque<Step>>,
    call_count: AtomicUsize,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Ok(_) => write!(f, "Ok(..)"),
            Step::Err(e) => write!(f, "Err({e})"),
            Step::Stream(_) => write!(f, "Stream(..)"),
            Step::StreamErr(e) => write!(f, "StreamErr({e})"),
        }
    }
}

impl FakeBackend {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            capabilities: Capabilities::minimal(SystemMessageStrategy::InMessages),
            queue: Mutex::new(steps.into()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// A backend that succeeds once with a fixed reply text.
    pub fn always_ok(name: impl Into<String>, reply: &str) -> Self {
        let name = name.into();
        Self::new(name.clone(), vec![Step::Ok(ok_response(&name, reply))])
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

pub fn ok_response(backend: &str, text: &str) -> Response {
    let mut metadata = Metadata::new(gatewayrs::ir::new_request_id());
    metadata.provenance.backend = Some(backend.to_string());
    Response {
        message: Message::assistant(text),
        finish_reason: FinishReason::Stop,
        usage: Some(TokenUsage::new(4, 2)),
        metadata,
        raw: None,
    }
}

pub fn sample_request() -> Request {
    Request::new(
        vec![Message::user("2+2?")],
        Metadata::new(gatewayrs::ir::new_request_id()),
    )
}

#[async_trait]
impl BackendAdapter for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn execute(&self, _request: Request) -> GatewayResult<Response> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let step = self.queue.lock().unwrap().pop_front();
        match step {
            Some(Step::Ok(mut response)) => {
                response.metadata.provenance.backend = Some(self.name.clone());
                Ok(response)
            }
            Some(Step::Err(err)) => Err(err),
            Some(Step::Stream(_)) | Some(Step::StreamErr(_)) => Err(GatewayError::internal(
                "fake backend: scripted a stream step for a non-streaming call",
            )),
            None => Err(GatewayError::no_backend_available(format!(
                "{}: no more scripted steps",
                self.name
            ))),
        }
    }

    async fn execute_stream(&self, _request: Request) -> GatewayResult<ChunkStream> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let step = self.queue.lock().unwrap().pop_front();
        match step {
            Some(Step::Stream(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            Some(Step::StreamErr(err)) => Err(err),
            Some(Step::Ok(_)) | Some(Step::Err(_)) => Err(GatewayError::internal(
                "fake backend: scripted a non-stream step for a streaming call",
            )),
            None => Err(GatewayError::no_backend_available(format!(
                "{}: no more scripted steps",
                self.name
            ))),
        }
    }
}

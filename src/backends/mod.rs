//! Backend adapters: IR → provider wire call, provider → IR.

pub mod http_util;

pub mod anthropic;
pub mod cohere;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod openai_compatible;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::pin::Pin;
use std::time::Duration;

use crate::error::GatewayResult;
use crate::ir::{Capabilities, Request, Response, StreamChunk};

/// Source a model catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Static,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: Option<String>,
    pub max_context_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResult {
    pub models: Vec<ModelInfo>,
    pub source: ModelSource,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub is_complete: bool,
}

/// Per-backend configuration, a shape shared across providers, with
/// provider-specific extras carried by
/// each concrete config type instead of a free-form map, so provider code
/// gets compile-time checked fields where it matters most (api key, base
/// URL, timeout).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub headers: std::collections::HashMap<String, String>,
    pub debug: bool,
    pub default_model: Option<String>,
    pub include_both_stream_fields: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: Duration::from_millis(30_000),
            max_retries: 0,
            headers: std::collections::HashMap::new(),
            debug: false,
            default_model: None,
            include_both_stream_fields: false,
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = GatewayResult<StreamChunk>> + Send>>;

/// Unified backend provider interface.
///
/// A trait object (`dyn BackendAdapter`), not a generic-associated-type
/// trait: the Router and Bridge hold a heterogeneous pool of backends, so
/// `transform_request`/`transform_response` are pure, synchronous-compatible
/// helpers callers can unit test directly, while `execute`/`execute_stream`
/// own the actual I/O.
#[async_trait]
pub trait BackendAdapter: Send + Sync + Debug + 'static {
    /// Unique identifier for routing and logging.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &Capabilities;

    /// Non-streaming execution. Implementations must emit
    /// `metadata.custom["latency_ms"]` measured from when the provider
    /// request is dispatched.
    async fn execute(&self, request: Request) -> GatewayResult<Response>;

    /// Streaming execution. Default: not supported.
    async fn execute_stream(&self, _request: Request) -> GatewayResult<ChunkStream> {
        Err(crate::error::GatewayError::unsupported_feature(format!(
            "{} does not support streaming",
            self.name()
        )))
    }

    /// Liveness probe. Default: always healthy,
    /// since not every backend has a cheap health endpoint.
    async fn health_check(&self) -> bool {
        true
    }

    /// Advisory cost estimate in USD, used by the `cost-optimized` routing
    /// strategy. Default: unknown.
    async fn estimate_cost(&self, _request: &Request) -> Option<f64> {
        None
    }

    /// Model catalog listing. Default: empty static list.
    async fn list_models(&self) -> GatewayResult<ModelListResult> {
        Ok(ModelListResult {
            models: Vec::new(),
            source: ModelSource::Static,
            fetched_at: chrono::Utc::now(),
            is_complete: true,
        })
    }
}

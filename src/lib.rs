//! # gatewayrs
//!
//! A universal AI-provider gateway: accepts chat-completion requests in any
//! one of several provider dialects and executes them against any supported
//! backend provider through a single, provider-neutral Intermediate
//! Representation (IR).
//!
//! Two entry points compose over the same IR:
//!
//! - [`bridge::Bridge`] wires one [`frontends::FrontendAdapter`] dialect to
//!   one backend target (a concrete [`backends::BackendAdapter`] or a
//!   [`router::Router`]), running every request through a configurable
//!   [`middleware`] chain and publishing lifecycle events and statistics.
//! - [`router::Router`] itself implements [`backends::BackendAdapter`], so it
//!   multiplexes a pool of backends behind routing policy, fallback, circuit
//!   breaking, health probing, and parallel dispatch, and can be dropped
//!   straight into a `Bridge` as its backend target.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatewayrs::backends::anthropic::{AnthropicBackend, AnthropicConfig};
//! use gatewayrs::bridge::{Bridge, BridgeConfig, RequestOptions};
//! use gatewayrs::frontends::openai::{OpenAiChatRequest, OpenAiFrontend, OpenAiMessage};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend: Arc<dyn gatewayrs::backends::BackendAdapter> =
//!     Arc::new(AnthropicBackend::new(AnthropicConfig::default())?);
//! let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default())?;
//!
//! let request = OpenAiChatRequest {
//!     model: "claude-3-5-sonnet-20241022".to_string(),
//!     messages: vec![OpenAiMessage {
//!         role: "user".to_string(),
//!         content: serde_json::json!("Hello!"),
//!         name: None,
//!     }],
//!     temperature: None,
//!     max_tokens: None,
//!     top_p: None,
//!     frequency_penalty: None,
//!     presence_penalty: None,
//!     stop: Vec::new(),
//!     seed: None,
//!     user: None,
//!     stream: false,
//! };
//! let response = bridge.chat(request, RequestOptions::default()).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod bridge;
pub mod config;
pub mod error;
pub mod frontends;
pub mod ir;
pub mod middleware;
pub mod models;
pub mod router;
pub mod streaming;

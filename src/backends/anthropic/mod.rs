//! Anthropic backend adapter: event-typed SSE streaming
//! (`message_start`/`content_block_delta`/`message_stop`), `separate-parameter`
//! system-message strategy, `x-api-key` + `anthropic-version` auth.

mod config;
mod provider;
mod streaming;

pub use config::AnthropicConfig;
pub use provider::AnthropicBackend;

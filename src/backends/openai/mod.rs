//! OpenAI backend adapter: SSE `data:`-framed streaming terminated by
//! `[DONE]`, `in-messages` system-message strategy.

mod config;
pub(crate) mod provider;
pub(crate) mod streaming;

pub use config::OpenAiConfig;
pub use provider::OpenAiBackend;

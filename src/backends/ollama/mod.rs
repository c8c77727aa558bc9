//! Ollama backend adapter: JSONL streaming, in-messages system strategy,
//! typically unauthenticated local deployment.

mod config;
mod provider;
mod streaming;

pub use config::OllamaConfig;
pub use provider::OllamaBackend;

//! Gemini backend adapter: streamed-JSON-array streaming, `system-instruction`
//! system-message strategy, API-key-as-query-parameter auth.

mod config;
mod provider;
mod streaming;

pub use config::GeminiConfig;
pub use provider::GeminiBackend;

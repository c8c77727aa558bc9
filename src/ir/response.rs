//! IR response and finish-reason taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;
use super::metadata::Metadata;

/// Terminal classification of a completion, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Cancelled,
    Error,
}

/// Approximate token accounting; providers count differently so this is
/// explicitly advisory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A complete (non-streaming) IR response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub message: Message,
    pub finish_reason: FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub metadata: Metadata,
    /// The raw provider payload, kept for debugging/passthrough; never
    /// interpreted downstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

//! Stream chunk protocol.
//!
//! Chunks are strictly ordered by `sequence`, starting at 0. A well-formed
//! stream ends with exactly one `Done` or one `Error` chunk and nothing
//! follows it; enforced by [`StreamChunk::is_terminal`] plus the
//! producer-side bookkeeping in [`crate::streaming`].

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::metadata::Metadata;
use super::response::{FinishReason, TokenUsage};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Start {
        sequence: u64,
        metadata: Metadata,
    },
    Content {
        sequence: u64,
        delta: String,
        role: Option<super::message::Role>,
        /// Present only when the caller opted into `StreamMode::Accumulated`
        /// (or a backend's `includeBoth` streaming config).
        #[serde(skip_serializing_if = "Option::is_none")]
        accumulated: Option<String>,
    },
    Metadata {
        sequence: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
    },
    Done {
        sequence: u64,
        finish_reason: FinishReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
        message: Message,
    },
    Error {
        sequence: u64,
        code: String,
        message: String,
    },
}

impl StreamChunk {
    pub fn sequence(&self) -> u64 {
        match self {
            StreamChunk::Start { sequence, .. }
            | StreamChunk::Content { sequence, .. }
            | StreamChunk::Metadata { sequence, .. }
            | StreamChunk::Done { sequence, .. }
            | StreamChunk::Error { sequence, .. } => *sequence,
        }
    }

    /// A well-formed stream has at most one terminal chunk, and nothing
    /// after it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done { .. } | StreamChunk::Error { .. })
    }

    pub fn as_content_delta(&self) -> Option<&str> {
        match self {
            StreamChunk::Content { delta, .. } => Some(delta),
            _ => None,
        }
    }
}

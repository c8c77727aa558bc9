//! Streaming plumbing shared by every backend adapter and the Bridge.
//!
//! The IR stream itself is just `ChunkStream` (see
//! [`crate::backends::ChunkStream`]) — a single-producer, single-consumer,
//! pull-driven `Stream`. What lives here is the handful of primitives every
//! producer needs: a cooperative cancellation token shared across the Bridge
//! and Router layers, and an accumulator that folds `content` deltas the way
//! `StreamChunk::Done`'s `message` field requires.

mod cancellation;
mod consumer;

pub use cancellation::{Cancellation, CancellationGuard};
pub use consumer::{accumulate_stream, drain_with_cancellation};

use crate::error::{GatewayError, GatewayResult};
use crate::ir::{FinishReason, Message, Role, StreamChunk, TokenUsage};

/// Folds a sequence of `Content` chunks into the running accumulated text,
/// the way every backend's stream parser must before emitting `Done`. Kept
/// side-effect free so both backend stream parsers and frontend
/// stream-to-accumulated re-emitters can share it.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    role: Option<Role>,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delta(&mut self, delta: &str, role: Option<Role>) {
        self.text.push_str(delta);
        if role.is_some() {
            self.role = role;
        }
    }

    pub fn set_usage(&mut self, usage: TokenUsage) {
        self.usage = Some(usage);
    }

    pub fn set_finish_reason(&mut self, reason: FinishReason) {
        self.finish_reason = Some(reason);
    }

    pub fn accumulated_text(&self) -> &str {
        &self.text
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// Builds the terminal `Done` chunk's fully-accumulated message. Falls
    /// back to `FinishReason::Stop` when a provider never surfaced one
    /// (observed with some OpenAI-compatible dialects that omit
    /// `finish_reason` on short responses).
    pub fn into_done(self, sequence: u64) -> StreamChunk {
        StreamChunk::Done {
            sequence,
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            usage: self.usage,
            message: Message::new(self.role.unwrap_or(Role::Assistant), self.text),
        }
    }
}

/// Validates that a finished chunk sequence is well-formed: sequence
/// numbers start at 0, strictly increase, and exactly one terminal chunk
/// (`Done` or `Error`) appears, with nothing after it. Used by tests and by
/// [`drain_with_cancellation`] in debug assertions.
pub fn validate_sequence(chunks: &[StreamChunk]) -> GatewayResult<()> {
    let mut expected = 0u64;
    let mut seen_terminal = false;
    for chunk in chunks {
        if seen_terminal {
            return Err(GatewayError::internal(
                "chunk emitted after a terminal chunk",
            ));
        }
        if chunk.sequence() != expected {
            return Err(GatewayError::internal(format!(
                "out-of-order stream sequence: expected {expected}, got {}",
                chunk.sequence()
            )));
        }
        expected += 1;
        if chunk.is_terminal() {
            seen_terminal = true;
        }
    }
    Ok(())
}

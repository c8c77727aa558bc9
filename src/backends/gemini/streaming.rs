use bytes::Bytes;
use futures::Stream;
use serde_json::Value;

use super::provider::{map_finish_reason, parse_candidate_text, parse_usage};
use crate::backends::http_util::JsonArrayFramer;
use crate::backends::ChunkStream;
use crate::error::GatewayError;
use crate::ir::{FinishReason, Message, Metadata, Role, StreamChunk, StreamMode};

/// Parses Gemini's `streamGenerateContent` response — a single top-level
/// JSON array whose elements arrive incrementally, each one shaped like a
/// complete (partial) `GenerateContentResponse` — into IR [`StreamChunk`]s.
/// Distinct from SSE/JSONL: there is no per-chunk framing byte beyond
/// ordinary JSON array punctuation, so [`JsonArrayFramer`] tracks brace
/// depth instead of newlines.
pub struct GeminiStreamParser {
    metadata: Metadata,
    backend_name: String,
    stream_mode: StreamMode,
}

impl GeminiStreamParser {
    pub fn new(mut metadata: Metadata, backend_name: String, stream_mode: StreamMode) -> Self {
        metadata.provenance.backend = Some(backend_name.clone());
        Self {
            metadata,
            backend_name,
            stream_mode,
        }
    }

    pub fn into_stream<S>(self, byte_stream: S) -> ChunkStream
    where
        S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    {
        Box::pin(async_stream::stream! {
            let mut framer = JsonArrayFramer::new();
            let mut sequence: u64 = 0;
            let mut accumulated = String::new();
            let mut finish_reason: Option<FinishReason> = None;
            let mut usage = None;
            let mut done_emitted = false;

            yield Ok(StreamChunk::Start { sequence, metadata: self.metadata.clone() });
            sequence += 1;

            futures::pin_mut!(byte_stream);
            use futures::StreamExt;

            while let Some(item) = byte_stream.next().await {
                let bytes = match item {
                    Ok(b) => b,
                    Err(e) => {
                        yield Ok(StreamChunk::Error {
                            sequence,
                            code: "network_error".to_string(),
                            message: e.to_string(),
                        });
                        done_emitted = true;
                        break;
                    }
                };

                for object in framer.push(&bytes) {
                    let parsed: Result<Value, _> = serde_json::from_str(&object);
                    let value = match parsed {
                        Ok(v) => v,
                        Err(e) => {
                            yield Err(GatewayError::stream_parse_error(format!(
                                "malformed chunk from {}: {e}", self.backend_name
                            )));
                            continue;
                        }
                    };

                    if let Some(u) = parse_usage(&value) {
                        usage = Some(u);
                    }

                    if let Some((text, reason)) = parse_candidate_text(&value) {
                        if !text.is_empty() {
                            accumulated.push_str(&text);
                            let accumulated_field = match self.stream_mode {
                                StreamMode::Accumulated => Some(accumulated.clone()),
                                StreamMode::Deltas => None,
                            };
                            yield Ok(StreamChunk::Content {
                                sequence,
                                delta: text,
                                role: Some(Role::Assistant),
                                accumulated: accumulated_field,
                            });
                            sequence += 1;
                        }
                        if let Some(r) = reason {
                            finish_reason = Some(map_finish_reason(&r));
                        }
                    }
                }
            }

            if !done_emitted {
                yield Ok(StreamChunk::Done {
                    sequence,
                    finish_reason: finish_reason.unwrap_or(FinishReason::Stop),
                    usage,
                    message: Message::assistant(accumulated),
                });
            }
        })
    }
}

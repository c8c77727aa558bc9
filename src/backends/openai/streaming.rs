use bytes::Bytes;
use futures::Stream;
use serde_json::Value;

use super::provider::map_finish_reason;
use crate::backends::http_util::{sse_data_payload, LineFramer, SSE_DONE_SENTINEL};
use crate::backends::ChunkStream;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{FinishReason, Message, Metadata, Role, StreamChunk, StreamMode, TokenUsage};

/// Parses OpenAI's SSE `data:`-framed, `[DONE]`-terminated chat-completion
/// stream into IR [`StreamChunk`]s.
pub struct OpenAiStreamParser {
    metadata: Metadata,
    backend_name: String,
    stream_mode: StreamMode,
}

impl OpenAiStreamParser {
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
            let mut framer = LineFramer::new();
            let mut sequence: u64 = 0;
            let mut accumulated = String::new();
            let mut finish_reason: Option<FinishReason> = None;
            let mut usage: Option<TokenUsage> = None;
            let mut role = Role::Assistant;
            let mut done_emitted = false;

            yield Ok(StreamChunk::Start { sequence, metadata: self.metadata.clone() });
            sequence += 1;

            futures::pin_mut!(byte_stream);
            use futures::StreamExt;

            'outer: while let Some(item) = byte_stream.next().await {
                let bytes = match item {
                    Ok(b) => b,
                    Err(e) => {
                        yield Ok(StreamChunk::Error {
                            sequence,
                            code: "network_error".to_string(),
                            message: e.to_string(),
                        });
                        done_emitted = true;
                        break 'outer;
                    }
                };

                for line in framer.push(&bytes) {
                    let Some(payload) = sse_data_payload(&line) else { continue };
                    if payload == SSE_DONE_SENTINEL {
                        let final_reason = finish_reason.unwrap_or(FinishReason::Stop);
                        yield Ok(StreamChunk::Done {
                            sequence,
                            finish_reason: final_reason,
                            usage: usage.clone(),
                            message: Message::assistant(accumulated.clone()),
                        });
                        done_emitted = true;
                        break 'outer;
                    }

                    let parsed: Result<Value, _> = serde_json::from_str(payload);
                    let value = match parsed {
                        Ok(v) => v,
                        Err(e) => {
                            yield Err(GatewayError::stream_parse_error(format!(
                                "malformed chunk from {}: {e}", self.backend_name
                            )));
                            continue;
                        }
                    };

                    if let Some(u) = value.get("usage").filter(|u| !u.is_null()) {
                        usage = Some(TokenUsage {
                            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                            completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                        });
                    }

                    let Some(choice) = value.get("choices").and_then(|c| c.get(0)) else { continue };
                    if let Some(r) = choice.get("role").and_then(Value::as_str) {
                        role = if r == "assistant" { Role::Assistant } else { role };
                    }
                    let delta = choice.get("delta");
                    if let Some(text) = delta.and_then(|d| d.get("content")).and_then(Value::as_str) {
                        if !text.is_empty() {
                            accumulated.push_str(text);
                            let accumulated_field = match self.stream_mode {
                                StreamMode::Accumulated => Some(accumulated.clone()),
                                StreamMode::Deltas => None,
                            };
                            yield Ok(StreamChunk::Content {
                                sequence,
                                delta: text.to_string(),
                                role: Some(role),
                                accumulated: accumulated_field,
                            });
                            sequence += 1;
                        }
                    }
                    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                        finish_reason = Some(map_finish_reason(reason));
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

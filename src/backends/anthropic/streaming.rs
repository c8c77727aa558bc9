use bytes::Bytes;
use futures::Stream;
use serde_json::Value;

use super::provider::map_finish_reason;
use crate::backends::http_util::{sse_data_payload, sse_event_name, LineFramer};
use crate::backends::ChunkStream;
use crate::error::GatewayError;
use crate::ir::{FinishReason, Message, Metadata, Role, StreamChunk, StreamMode, TokenUsage};

/// Parses Anthropic's event-typed SSE stream
/// (`message_start`/`content_block_delta`/`message_delta`/`message_stop`)
/// into IR [`StreamChunk`]s. Unlike OpenAI's single `data:`-only frame,
/// each event here carries both an `event:` name and a
/// `data:` payload, and usage/finish_reason arrive on separate event types
/// rather than alongside every delta.
pub struct AnthropicStreamParser {
    metadata: Metadata,
    backend_name: String,
    stream_mode: StreamMode,
}

impl AnthropicStreamParser {
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
            let mut prompt_tokens: u32 = 0;
            let mut pending_event: Option<String> = None;
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
                    if let Some(name) = sse_event_name(&line) {
                        pending_event = Some(name.to_string());
                        continue;
                    }
                    let Some(payload) = sse_data_payload(&line) else { continue };
                    let event = pending_event.take().unwrap_or_default();

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

                    match event.as_str() {
                        "message_start" => {
                            if let Some(u) = value.get("message").and_then(|m| m.get("usage")) {
                                prompt_tokens = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
                            }
                        }
                        "content_block_delta" => {
                            let delta = value.get("delta");
                            if let Some(text) = delta
                                .filter(|d| d.get("type").and_then(Value::as_str) == Some("text_delta"))
                                .and_then(|d| d.get("text"))
                                .and_then(Value::as_str)
                            {
                                if !text.is_empty() {
                                    accumulated.push_str(text);
                                    let accumulated_field = match self.stream_mode {
                                        StreamMode::Accumulated => Some(accumulated.clone()),
                                        StreamMode::Deltas => None,
                                    };
                                    yield Ok(StreamChunk::Content {
                                        sequence,
                                        delta: text.to_string(),
                                        role: Some(Role::Assistant),
                                        accumulated: accumulated_field,
                                    });
                                    sequence += 1;
                                }
                            }
                        }
                        "message_delta" => {
                            if let Some(reason) = value
                                .get("delta")
                                .and_then(|d| d.get("stop_reason"))
                                .and_then(Value::as_str)
                            {
                                finish_reason = Some(map_finish_reason(reason));
                            }
                            if let Some(u) = value.get("usage") {
                                let completion = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
                                usage = Some(TokenUsage::new(prompt_tokens, completion));
                            }
                        }
                        "message_stop" => {
                            yield Ok(StreamChunk::Done {
                                sequence,
                                finish_reason: finish_reason.unwrap_or(FinishReason::Stop),
                                usage: usage.clone(),
                                message: Message::assistant(accumulated.clone()),
                            });
                            done_emitted = true;
                            break 'outer;
                        }
                        "error" => {
                            let message = value
                                .get("error")
                                .and_then(|e| e.get("message"))
                                .and_then(Value::as_str)
                                .unwrap_or("anthropic stream error")
                                .to_string();
                            yield Ok(StreamChunk::Error {
                                sequence,
                                code: "provider_error".to_string(),
                                message,
                            });
                            done_emitted = true;
                            break 'outer;
                        }
                        // "ping", "content_block_start", "content_block_stop" carry
                        // nothing the IR needs to surface.
                        _ => {}
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

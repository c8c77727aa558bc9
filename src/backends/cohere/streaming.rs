use bytes::Bytes;
use futures::Stream;
use serde_json::Value;

use super::provider::map_finish_reason;
use crate::backends::http_util::LineFramer;
use crate::backends::ChunkStream;
use crate::error::GatewayError;
use crate::ir::{FinishReason, Message, Metadata, Role, StreamChunk, StreamMode, TokenUsage};

/// Parses Cohere's newline-delimited `event_type`-tagged stream
/// (`stream-start` / `text-generation` / `stream-end`) into IR
/// [`StreamChunk`]s.
pub struct CohereStreamParser {
    metadata: Metadata,
    backend_name: String,
    stream_mode: StreamMode,
}

impl CohereStreamParser {
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
                    if line.trim().is_empty() {
                        continue;
                    }
                    let parsed: Result<Value, _> = serde_json::from_str(&line);
                    let value = match parsed {
                        Ok(v) => v,
                        Err(e) => {
                            yield Err(GatewayError::stream_parse_error(format!(
                                "malformed event from {}: {e}", self.backend_name
                            )));
                            continue;
                        }
                    };

                    match value.get("event_type").and_then(Value::as_str) {
                        Some("text-generation") => {
                            if let Some(text) = value.get("text").and_then(Value::as_str) {
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
                        Some("stream-end") => {
                            let response = value.get("response");
                            let finish_reason = response
                                .and_then(|r| r.get("finish_reason"))
                                .and_then(Value::as_str)
                                .map(map_finish_reason)
                                .unwrap_or(FinishReason::Stop);
                            let usage = response
                                .and_then(|r| r.get("meta"))
                                .and_then(|m| m.get("tokens"))
                                .map(|t| {
                                    let prompt = t.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
                                    let completion = t.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
                                    TokenUsage::new(prompt, completion)
                                });
                            yield Ok(StreamChunk::Done {
                                sequence,
                                finish_reason,
                                usage,
                                message: Message::assistant(accumulated.clone()),
                            });
                            done_emitted = true;
                            break 'outer;
                        }
                        _ => {}
                    }
                }
            }

            if !done_emitted {
                yield Ok(StreamChunk::Done {
                    sequence,
                    finish_reason: FinishReason::Stop,
                    usage: None,
                    message: Message::assistant(accumulated),
                });
            }
        })
    }
}

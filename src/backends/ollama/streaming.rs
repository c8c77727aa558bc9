use bytes::Bytes;
use futures::Stream;
use serde_json::Value;

use crate::backends::http_util::LineFramer;
use crate::backends::ChunkStream;
use crate::error::GatewayError;
use crate::ir::{FinishReason, Message, Metadata, Role, StreamChunk, StreamMode, TokenUsage};

/// Parses Ollama's JSONL stream — one complete JSON object per line, the
/// last one carrying `"done": true` — into IR [`StreamChunk`]s. Unlike SSE,
/// there is no `data:` prefix to strip; each line *is* the payload.
pub struct OllamaStreamParser {
    metadata: Metadata,
    backend_name: String,
    stream_mode: StreamMode,
}

impl OllamaStreamParser {
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
                                "malformed line from {}: {e}", self.backend_name
                            )));
                            continue;
                        }
                    };

                    if let Some(text) = value
                        .get("message")
                        .and_then(|m| m.get("content"))
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                    {
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

                    if value.get("done").and_then(Value::as_bool) == Some(true) {
                        let usage = TokenUsage::new(
                            value.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0) as u32,
                            value.get("eval_count").and_then(Value::as_u64).unwrap_or(0) as u32,
                        );
                        yield Ok(StreamChunk::Done {
                            sequence,
                            finish_reason: FinishReason::Stop,
                            usage: Some(usage),
                            message: Message::assistant(accumulated.clone()),
                        });
                        done_emitted = true;
                        break 'outer;
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

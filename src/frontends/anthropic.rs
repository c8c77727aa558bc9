//! Anthropic Messages API dialect, implemented at full depth.
//!
//! The interesting part of this adapter is the round-trip in §4.2's
//! invariant: Anthropic's `system` is a separate top-level string, not a
//! message, so `to_ir` lifts it into a leading system [`Message`] and
//! `from_ir`'s counterpart (in the backend, not here — this frontend only
//! ever sees IR *produced* by some backend, already normalized) has nothing
//! to lower back, since `Response` carries a single assistant message, not
//! the original request shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{DialectStream, FrontendAdapter};
use crate::backends::ChunkStream;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Content, ContentPart, Fidelity, FinishReason, ImageSource, Message, Metadata, Parameters,
    Request, Response, Role, SemanticTransform, StreamChunk, TokenUsage,
};

const UNIFIED_TEMPERATURE_RANGE: (f32, f32) = Parameters::UNIFIED_TEMPERATURE_RANGE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessagesRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub content: Vec<AnthropicContentBlock>,
    pub model: String,
    pub stop_reason: String,
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart { message: AnthropicMessagesResponse },
    ContentBlockDelta { index: u32, delta: AnthropicDelta },
    MessageDelta { delta: AnthropicStopDelta, usage: AnthropicUsage },
    MessageStop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicDelta {
    #[serde(rename = "type")]
    pub delta_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicStopDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct AnthropicFrontend;

impl AnthropicFrontend {
    pub fn new() -> Self {
        Self
    }
}

fn role_from_str(s: &str) -> GatewayResult<Role> {
    match s {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(GatewayError::invalid_message_format(format!(
            "unknown anthropic role: {other}"
        ))),
    }
}

fn content_from_value(value: &Value) -> Content {
    match value {
        Value::String(s) => Content::Text(s.clone()),
        Value::Array(blocks) => {
            let parts: Vec<ContentPart> = blocks
                .iter()
                .filter_map(|b| {
                    let ty = b.get("type").and_then(Value::as_str)?;
                    match ty {
                        "text" => Some(ContentPart::text(b.get("text")?.as_str()?)),
                        "image" => {
                            let source = b.get("source")?;
                            match source.get("type").and_then(Value::as_str)? {
                                "url" => Some(ContentPart::Image {
                                    source: ImageSource::Url {
                                        url: source.get("url")?.as_str()?.to_string(),
                                    },
                                }),
                                "base64" => Some(ContentPart::Image {
                                    source: ImageSource::Base64 {
                                        media_type: source
                                            .get("media_type")?
                                            .as_str()?
                                            .to_string(),
                                        data: source.get("data")?.as_str()?.to_string(),
                                    },
                                }),
                                _ => None,
                            }
                        }
                        _ => None,
                    }
                })
                .collect();
            Content::Parts(parts)
        }
        _ => Content::Text(String::new()),
    }
}

/// Scales a unified-range (0..2) temperature into Anthropic's dialect value
/// on the way in. The IR itself always stores the unified range; this
/// conversion only applies to the dialect surface — temperature
/// normalization happens at dialect entry/exit, not in IR storage.
fn scale_temperature_in(unified: f32) -> f32 {
    unified.clamp(UNIFIED_TEMPERATURE_RANGE.0, UNIFIED_TEMPERATURE_RANGE.1)
}

fn finish_reason_to_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
        FinishReason::ContentFilter => "end_turn",
        FinishReason::Cancelled => "end_turn",
        FinishReason::Error => "end_turn",
    }
}

#[async_trait]
impl FrontendAdapter for AnthropicFrontend {
    type DialectRequest = AnthropicMessagesRequest;
    type DialectResponse = AnthropicMessagesResponse;
    type DialectStreamItem = AnthropicStreamEvent;

    fn name(&self) -> &str {
        "anthropic"
    }

    fn to_ir(&self, request: Self::DialectRequest) -> GatewayResult<Request> {
        if request.messages.is_empty() {
            return Err(GatewayError::invalid_request(
                "anthropic request must contain at least one message",
            ));
        }
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        let mut metadata = Metadata::new(crate::ir::new_request_id());
        if let Some(system) = &request.system {
            messages.push(Message::system(system.clone()));
        }
        for m in &request.messages {
            messages.push(Message {
                role: role_from_str(&m.role)?,
                content: content_from_value(&m.content),
                name: None,
                provider_metadata: HashMap::new(),
            });
        }

        let temperature = request.temperature.map(|t| {
            let scaled = scale_temperature_in(t);
            if (scaled - t).abs() > f32::EPSILON {
                metadata = metadata.with_semantic_transform(SemanticTransform {
                    parameter: "temperature".to_string(),
                    original_value: serde_json::json!(t),
                    transformed_value: serde_json::json!(scaled),
                    reason: "clamped into the unified 0..2 range on dialect entry".to_string(),
                    fidelity: Fidelity::Approximate,
                });
            }
            scaled
        });

        let parameters = Parameters {
            model: Some(request.model.clone()),
            temperature,
            max_tokens: Some(request.max_tokens),
            top_p: request.top_p,
            top_k: request.top_k,
            stop_sequences: request.stop_sequences.clone(),
            ..Default::default()
        };

        let mut ir = Request::new(messages, metadata);
        ir.parameters = Some(parameters);
        ir.stream = request.stream;
        ir.metadata.provenance.frontend = Some(self.name().to_string());
        Ok(ir)
    }

    fn from_ir(&self, response: Response) -> GatewayResult<Self::DialectResponse> {
        let text = response.message.content.as_text();
        Ok(AnthropicMessagesResponse {
            id: response.metadata.request_id.clone(),
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            content: vec![AnthropicContentBlock {
                block_type: "text".to_string(),
                text: Some(text),
            }],
            model: response
                .metadata
                .custom
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            stop_reason: finish_reason_to_str(response.finish_reason).to_string(),
            usage: AnthropicUsage {
                input_tokens: response.usage.map(|u| u.prompt_tokens).unwrap_or(0),
                output_tokens: response.usage.map(|u| u.completion_tokens).unwrap_or(0),
            },
        })
    }

    fn from_ir_stream(&self, stream: ChunkStream) -> DialectStream<Self::DialectStreamItem> {
        Box::pin(async_stream::stream! {
            use futures::StreamExt;
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamChunk::Start { .. }) => {
                        yield Ok(AnthropicStreamEvent::MessageStart {
                            message: AnthropicMessagesResponse {
                                id: "msg".to_string(),
                                response_type: "message".to_string(),
                                role: "assistant".to_string(),
                                content: Vec::new(),
                                model: String::new(),
                                stop_reason: String::new(),
                                usage: AnthropicUsage { input_tokens: 0, output_tokens: 0 },
                            },
                        });
                    }
                    Ok(StreamChunk::Content { delta, .. }) => {
                        yield Ok(AnthropicStreamEvent::ContentBlockDelta {
                            index: 0,
                            delta: AnthropicDelta {
                                delta_type: "text_delta".to_string(),
                                text: Some(delta),
                            },
                        });
                    }
                    Ok(StreamChunk::Metadata { .. }) => {}
                    Ok(StreamChunk::Done { finish_reason, usage, .. }) => {
                        yield Ok(AnthropicStreamEvent::MessageDelta {
                            delta: AnthropicStopDelta {
                                stop_reason: Some(finish_reason_to_str(finish_reason).to_string()),
                            },
                            usage: AnthropicUsage {
                                input_tokens: usage.map(|u| u.prompt_tokens).unwrap_or(0),
                                output_tokens: usage.map(|u| u.completion_tokens).unwrap_or(0),
                            },
                        });
                        yield Ok(AnthropicStreamEvent::MessageStop);
                    }
                    Ok(StreamChunk::Error { code, message, .. }) => {
                        yield Err(GatewayError::stream_parse_error(format!("{code}: {message}")));
                    }
                    Err(e) => yield Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifts_system_string_into_leading_message() {
        let frontend = AnthropicFrontend::new();
        let req = AnthropicMessagesRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: Value::String("2+2?".to_string()),
            }],
            system: Some("Be terse.".to_string()),
            max_tokens: 1024,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: Vec::new(),
            stream: false,
        };
        let ir = frontend.to_ir(req).unwrap();
        assert_eq!(ir.messages.len(), 2);
        assert_eq!(ir.messages[0].role, Role::System);
        assert_eq!(ir.messages[0].content.as_text(), "Be terse.");
        assert_eq!(ir.messages[1].role, Role::User);
    }

    #[test]
    fn clamps_out_of_range_temperature_and_records_drift() {
        let frontend = AnthropicFrontend::new();
        let req = AnthropicMessagesRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: Value::String("hi".to_string()),
            }],
            system: None,
            max_tokens: 1024,
            temperature: Some(3.0),
            top_p: None,
            top_k: None,
            stop_sequences: Vec::new(),
            stream: false,
        };
        let ir = frontend.to_ir(req).unwrap();
        assert_eq!(ir.parameters.as_ref().unwrap().temperature, Some(2.0));
        assert_eq!(ir.metadata.warnings.len(), 1);
    }

    #[test]
    fn converts_ir_response_to_dialect_content_block() {
        let frontend = AnthropicFrontend::new();
        let response = Response {
            message: Message::assistant("4"),
            finish_reason: FinishReason::Stop,
            usage: Some(TokenUsage::new(5, 1)),
            metadata: Metadata::new("req-1"),
            raw: None,
        };
        let dialect = frontend.from_ir(response).unwrap();
        assert_eq!(dialect.content[0].text.as_deref(), Some("4"));
        assert_eq!(dialect.stop_reason, "end_turn");
        assert_eq!(dialect.usage.input_tokens, 5);
    }
}

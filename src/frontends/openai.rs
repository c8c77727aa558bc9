//! OpenAI chat-completions dialect, implemented at full depth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{DialectStream, FrontendAdapter};
use crate::backends::ChunkStream;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Content, ContentPart, FinishReason, ImageSource, Message, Metadata, Parameters, Request,
    Response, Role, StreamChunk, TokenUsage,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub message: OpenAiMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatResponse {
    pub id: String,
    pub object: String,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChoice {
    pub index: u32,
    pub delta: OpenAiDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChunk {
    pub id: String,
    pub object: String,
    pub model: String,
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Default)]
pub struct OpenAiFrontend;

impl OpenAiFrontend {
    pub fn new() -> Self {
        Self
    }
}

fn role_from_str(s: &str) -> GatewayResult<Role> {
    match s {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" | "function" => Ok(Role::Tool),
        other => Err(GatewayError::invalid_message_format(format!(
            "unknown openai role: {other}"
        ))),
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn content_from_value(value: &Value) -> Content {
    match value {
        Value::String(s) => Content::Text(s.clone()),
        Value::Array(parts) => {
            let rendered: Vec<ContentPart> = parts
                .iter()
                .filter_map(|p| {
                    let ty = p.get("type").and_then(Value::as_str)?;
                    match ty {
                        "text" => Some(ContentPart::text(p.get("text")?.as_str()?)),
                        "image_url" => {
                            let url = p.get("image_url")?.get("url")?.as_str()?.to_string();
                            Some(ContentPart::Image {
                                source: ImageSource::Url { url },
                            })
                        }
                        _ => None,
                    }
                })
                .collect();
            Content::Parts(rendered)
        }
        _ => Content::Text(String::new()),
    }
}

fn content_to_value(content: &Content) -> Value {
    match content {
        Content::Text(t) => Value::String(t.clone()),
        Content::Parts(parts) => {
            let rendered: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => {
                        Some(serde_json::json!({"type": "text", "text": text}))
                    }
                    ContentPart::Image {
                        source: ImageSource::Url { url },
                    } => Some(serde_json::json!({"type": "image_url", "image_url": {"url": url}})),
                    ContentPart::Image {
                        source: ImageSource::Base64 { media_type, data },
                    } => Some(serde_json::json!({
                        "type": "image_url",
                        "image_url": {"url": format!("data:{media_type};base64,{data}")}
                    })),
                    _ => None,
                })
                .collect();
            Value::Array(rendered)
        }
    }
}

fn finish_reason_to_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::Cancelled => "stop",
        FinishReason::Error => "stop",
    }
}

#[async_trait]
impl FrontendAdapter for OpenAiFrontend {
    type DialectRequest = OpenAiChatRequest;
    type DialectResponse = OpenAiChatResponse;
    type DialectStreamItem = OpenAiStreamChunk;

    fn name(&self) -> &str {
        "openai"
    }

    fn to_ir(&self, request: Self::DialectRequest) -> GatewayResult<Request> {
        if request.messages.is_empty() {
            return Err(GatewayError::invalid_request(
                "openai request must contain at least one message",
            ));
        }
        let messages = request
            .messages
            .iter()
            .map(|m| {
                Ok(Message {
                    role: role_from_str(&m.role)?,
                    content: content_from_value(&m.content),
                    name: m.name.clone(),
                    provider_metadata: HashMap::new(),
                })
            })
            .collect::<GatewayResult<Vec<Message>>>()?;

        let parameters = Parameters {
            model: Some(request.model.clone()),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            stop_sequences: request.stop.clone(),
            seed: request.seed,
            user: request.user.clone(),
            ..Default::default()
        };

        let mut ir = Request::new(messages, Metadata::new(crate::ir::new_request_id()));
        ir.parameters = Some(parameters);
        ir.stream = request.stream;
        ir.metadata.provenance.frontend = Some(self.name().to_string());
        Ok(ir)
    }

    fn from_ir(&self, response: Response) -> GatewayResult<Self::DialectResponse> {
        Ok(OpenAiChatResponse {
            id: response.metadata.request_id.clone(),
            object: "chat.completion".to_string(),
            model: response
                .metadata
                .custom
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            choices: vec![OpenAiChoice {
                index: 0,
                message: OpenAiMessage {
                    role: role_to_str(response.message.role).to_string(),
                    content: content_to_value(&response.message.content),
                    name: response.message.name.clone(),
                },
                finish_reason: finish_reason_to_str(response.finish_reason).to_string(),
            }],
            usage: response.usage.map(usage_to_dialect),
        })
    }

    fn from_ir_stream(&self, stream: ChunkStream) -> DialectStream<Self::DialectStreamItem> {
        Box::pin(async_stream::stream! {
            use futures::StreamExt;
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamChunk::Start { .. }) => {
                        yield Ok(OpenAiStreamChunk {
                            id: "chatcmpl".to_string(),
                            object: "chat.completion.chunk".to_string(),
                            model: String::new(),
                            choices: vec![OpenAiStreamChoice {
                                index: 0,
                                delta: OpenAiDelta { role: Some("assistant".to_string()), content: None },
                                finish_reason: None,
                            }],
                            usage: None,
                        });
                    }
                    Ok(StreamChunk::Content { delta, .. }) => {
                        yield Ok(OpenAiStreamChunk {
                            id: "chatcmpl".to_string(),
                            object: "chat.completion.chunk".to_string(),
                            model: String::new(),
                            choices: vec![OpenAiStreamChoice {
                                index: 0,
                                delta: OpenAiDelta { role: None, content: Some(delta) },
                                finish_reason: None,
                            }],
                            usage: None,
                        });
                    }
                    Ok(StreamChunk::Metadata { .. }) => {}
                    Ok(StreamChunk::Done { finish_reason, usage, .. }) => {
                        yield Ok(OpenAiStreamChunk {
                            id: "chatcmpl".to_string(),
                            object: "chat.completion.chunk".to_string(),
                            model: String::new(),
                            choices: vec![OpenAiStreamChoice {
                                index: 0,
                                delta: OpenAiDelta { role: None, content: None },
                                finish_reason: Some(finish_reason_to_str(finish_reason).to_string()),
                            }],
                            usage: usage.map(usage_to_dialect),
                        });
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

fn usage_to_dialect(usage: TokenUsage) -> OpenAiUsage {
    OpenAiUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_system_and_user_messages_to_ir() {
        let frontend = OpenAiFrontend::new();
        let req = OpenAiChatRequest {
            model: "gpt-4".to_string(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: Value::String("be terse".to_string()),
                    name: None,
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: Value::String("2+2?".to_string()),
                    name: None,
                },
            ],
            temperature: Some(0.7),
            max_tokens: Some(16),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: Vec::new(),
            seed: None,
            user: None,
            stream: false,
        };
        let ir = frontend.to_ir(req).unwrap();
        assert_eq!(ir.messages.len(), 2);
        assert_eq!(ir.messages[0].role, Role::System);
        assert_eq!(ir.parameters.unwrap().temperature, Some(0.7));
    }

    #[test]
    fn rejects_empty_message_list() {
        let frontend = OpenAiFrontend::new();
        let req = OpenAiChatRequest {
            model: "gpt-4".to_string(),
            messages: vec![],
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: Vec::new(),
            seed: None,
            user: None,
            stream: false,
        };
        assert!(frontend.to_ir(req).is_err());
    }

    #[test]
    fn converts_ir_response_back_to_dialect() {
        let frontend = OpenAiFrontend::new();
        let response = Response {
            message: Message::assistant("4"),
            finish_reason: FinishReason::Stop,
            usage: Some(TokenUsage::new(10, 1)),
            metadata: Metadata::new("req-1"),
            raw: None,
        };
        let dialect = frontend.from_ir(response).unwrap();
        assert_eq!(dialect.choices[0].message.content, Value::String("4".to_string()));
        assert_eq!(dialect.choices[0].finish_reason, "stop");
        assert_eq!(dialect.usage.unwrap().total_tokens, 11);
    }
}

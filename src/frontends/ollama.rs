//! Ollama `/api/chat` dialect, implemented at compatible-subset depth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{DialectStream, FrontendAdapter};
use crate::backends::ChunkStream;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{Content, FinishReason, Message, Metadata, Parameters, Request, Response, Role, StreamChunk};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatResponse {
    pub model: String,
    pub message: OllamaChatMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
}

#[derive(Debug, Default)]
pub struct OllamaFrontend;

impl OllamaFrontend {
    pub fn new() -> Self {
        Self
    }
}

fn role_from_str(s: &str) -> GatewayResult<Role> {
    match s {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(GatewayError::invalid_message_format(format!(
            "unknown ollama role: {other}"
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

#[async_trait]
impl FrontendAdapter for OllamaFrontend {
    type DialectRequest = OllamaChatRequest;
    type DialectResponse = OllamaChatResponse;
    type DialectStreamItem = OllamaChatResponse;

    fn name(&self) -> &str {
        "ollama"
    }

    fn to_ir(&self, request: Self::DialectRequest) -> GatewayResult<Request> {
        if request.messages.is_empty() {
            return Err(GatewayError::invalid_request(
                "ollama request must contain at least one message",
            ));
        }
        let messages = request
            .messages
            .iter()
            .map(|m| {
                Ok(Message {
                    role: role_from_str(&m.role)?,
                    content: Content::Text(m.content.clone()),
                    name: None,
                    provider_metadata: HashMap::new(),
                })
            })
            .collect::<GatewayResult<Vec<Message>>>()?;

        let parameters = Parameters {
            model: Some(request.model.clone()),
            temperature: request.options.as_ref().and_then(|o| o.temperature),
            top_p: request.options.as_ref().and_then(|o| o.top_p),
            top_k: request.options.as_ref().and_then(|o| o.top_k),
            ..Default::default()
        };

        let mut ir = Request::new(messages, Metadata::new(crate::ir::new_request_id()));
        ir.parameters = Some(parameters);
        ir.stream = request.stream;
        ir.metadata.provenance.frontend = Some(self.name().to_string());
        Ok(ir)
    }

    fn from_ir(&self, response: Response) -> GatewayResult<Self::DialectResponse> {
        Ok(OllamaChatResponse {
            model: response
                .metadata
                .custom
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            message: OllamaChatMessage {
                role: role_to_str(response.message.role).to_string(),
                content: response.message.content.as_text(),
            },
            done: true,
            prompt_eval_count: response.usage.map(|u| u.prompt_tokens),
            eval_count: response.usage.map(|u| u.completion_tokens),
        })
    }

    fn from_ir_stream(&self, stream: ChunkStream) -> DialectStream<Self::DialectStreamItem> {
        Box::pin(async_stream::stream! {
            use futures::StreamExt;
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamChunk::Content { delta, .. }) => {
                        yield Ok(OllamaChatResponse {
                            model: String::new(),
                            message: OllamaChatMessage { role: "assistant".to_string(), content: delta },
                            done: false,
                            prompt_eval_count: None,
                            eval_count: None,
                        });
                    }
                    Ok(StreamChunk::Done { usage, .. }) => {
                        yield Ok(OllamaChatResponse {
                            model: String::new(),
                            message: OllamaChatMessage { role: "assistant".to_string(), content: String::new() },
                            done: true,
                            prompt_eval_count: usage.map(|u| u.prompt_tokens),
                            eval_count: usage.map(|u| u.completion_tokens),
                        });
                    }
                    Ok(StreamChunk::Start { .. }) | Ok(StreamChunk::Metadata { .. }) => {}
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
    fn converts_messages_and_options_to_ir() {
        let frontend = OllamaFrontend::new();
        let req = OllamaChatRequest {
            model: "llama3".to_string(),
            messages: vec![OllamaChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            options: Some(OllamaOptions {
                temperature: Some(0.2),
                top_p: None,
                top_k: Some(40),
            }),
            stream: false,
        };
        let ir = frontend.to_ir(req).unwrap();
        assert_eq!(ir.messages[0].role, Role::User);
        let params = ir.parameters.unwrap();
        assert_eq!(params.temperature, Some(0.2));
        assert_eq!(params.top_k, Some(40));
    }

    #[test]
    fn converts_ir_response_to_done_dialect_response() {
        let frontend = OllamaFrontend::new();
        let response = Response {
            message: Message::assistant("hi there"),
            finish_reason: FinishReason::Stop,
            usage: Some(crate::ir::TokenUsage::new(3, 2)),
            metadata: Metadata::new("req-1"),
            raw: None,
        };
        let dialect = frontend.from_ir(response).unwrap();
        assert!(dialect.done);
        assert_eq!(dialect.message.content, "hi there");
        assert_eq!(dialect.prompt_eval_count, Some(3));
    }
}

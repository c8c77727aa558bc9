//! Gemini `generateContent` dialect, covering the request/response shape
//! but not every Gemini-specific knob, matching the Gemini *backend*'s own
//! scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{DialectStream, FrontendAdapter};
use crate::backends::ChunkStream;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{Content, FinishReason, Message, Metadata, Parameters, Request, Response, Role, StreamChunk};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "topP")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiGenerateContentRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "generationConfig")]
    pub generation_config: Option<GeminiGenerationConfig>,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiCandidate {
    pub content: GeminiContent,
    #[serde(rename = "finishReason")]
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiGenerateContentResponse {
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Default)]
pub struct GeminiFrontend;

impl GeminiFrontend {
    pub fn new() -> Self {
        Self
    }
}

fn role_from_str(s: &str) -> Role {
    match s {
        "model" => Role::Assistant,
        "function" => Role::Tool,
        _ => Role::User,
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::Tool => "function",
        Role::User | Role::System => "user",
    }
}

fn finish_reason_to_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "STOP",
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::ContentFilter => "SAFETY",
        FinishReason::ToolCalls => "STOP",
        FinishReason::Cancelled => "STOP",
        FinishReason::Error => "STOP",
    }
}

#[async_trait]
impl FrontendAdapter for GeminiFrontend {
    type DialectRequest = GeminiGenerateContentRequest;
    type DialectResponse = GeminiGenerateContentResponse;
    type DialectStreamItem = GeminiGenerateContentResponse;

    fn name(&self) -> &str {
        "gemini"
    }

    fn to_ir(&self, request: Self::DialectRequest) -> GatewayResult<Request> {
        if request.contents.is_empty() {
            return Err(GatewayError::invalid_request(
                "gemini request must contain at least one content entry",
            ));
        }
        let messages = request
            .contents
            .iter()
            .map(|c| Message {
                role: role_from_str(&c.role),
                content: Content::Text(
                    c.parts.iter().map(|p| p.text.clone()).collect::<Vec<_>>().join(""),
                ),
                name: None,
                provider_metadata: HashMap::new(),
            })
            .collect();

        let parameters = request.generation_config.as_ref().map(|gc| Parameters {
            model: if request.model.is_empty() {
                None
            } else {
                Some(request.model.clone())
            },
            temperature: gc.temperature,
            max_tokens: gc.max_output_tokens,
            top_p: gc.top_p,
            ..Default::default()
        });

        let mut ir = Request::new(messages, Metadata::new(crate::ir::new_request_id()));
        ir.parameters = parameters;
        ir.metadata.provenance.frontend = Some(self.name().to_string());
        Ok(ir)
    }

    fn from_ir(&self, response: Response) -> GatewayResult<Self::DialectResponse> {
        Ok(GeminiGenerateContentResponse {
            candidates: vec![GeminiCandidate {
                content: GeminiContent {
                    role: role_to_str(response.message.role).to_string(),
                    parts: vec![GeminiPart {
                        text: response.message.content.as_text(),
                    }],
                },
                finish_reason: finish_reason_to_str(response.finish_reason).to_string(),
            }],
        })
    }

    fn from_ir_stream(&self, stream: ChunkStream) -> DialectStream<Self::DialectStreamItem> {
        Box::pin(async_stream::stream! {
            use futures::StreamExt;
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamChunk::Content { delta, .. }) => {
                        yield Ok(GeminiGenerateContentResponse {
                            candidates: vec![GeminiCandidate {
                                content: GeminiContent {
                                    role: "model".to_string(),
                                    parts: vec![GeminiPart { text: delta }],
                                },
                                finish_reason: String::new(),
                            }],
                        });
                    }
                    Ok(StreamChunk::Done { finish_reason, message, .. }) => {
                        yield Ok(GeminiGenerateContentResponse {
                            candidates: vec![GeminiCandidate {
                                content: GeminiContent {
                                    role: "model".to_string(),
                                    parts: vec![GeminiPart { text: message.content.as_text() }],
                                },
                                finish_reason: finish_reason_to_str(finish_reason).to_string(),
                            }],
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
    fn converts_contents_to_ir_messages() {
        let frontend = GeminiFrontend::new();
        let req = GeminiGenerateContentRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: "hi".to_string() }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: Some(0.5),
                max_output_tokens: Some(128),
                top_p: None,
            }),
            model: "gemini-1.5-pro".to_string(),
        };
        let ir = frontend.to_ir(req).unwrap();
        assert_eq!(ir.messages[0].role, Role::User);
        assert_eq!(ir.parameters.unwrap().temperature, Some(0.5));
    }

    #[test]
    fn rejects_empty_contents() {
        let frontend = GeminiFrontend::new();
        let req = GeminiGenerateContentRequest {
            contents: vec![],
            generation_config: None,
            model: String::new(),
        };
        assert!(frontend.to_ir(req).is_err());
    }
}

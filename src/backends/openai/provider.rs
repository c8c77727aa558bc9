use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

use super::config::OpenAiConfig;
use super::streaming::OpenAiStreamParser;
use crate::backends::{BackendAdapter, ChunkStream, ModelInfo, ModelListResult, ModelSource};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Capabilities, Content, FinishReason, Message, Metadata, Response, Role, Request,
    SystemMessageStrategy, TokenUsage,
};

#[derive(Debug)]
pub struct OpenAiBackend {
    config: OpenAiConfig,
    client: reqwest::Client,
    capabilities: Capabilities,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.common.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        let mut capabilities = Capabilities::minimal(SystemMessageStrategy::InMessages);
        capabilities.tools = true;
        capabilities.multi_modal = true;
        capabilities.supports_frequency_penalty = true;
        capabilities.supports_presence_penalty = true;
        capabilities.supports_seed = true;
        capabilities.max_stop_sequences = Some(4);
        Ok(Self {
            config,
            client,
            capabilities,
        })
    }

    /// Pure transform: IR request → OpenAI chat-completions JSON body.
    ///
    /// System-message strategy is `in-messages`: system messages stay
    /// inline, in order, as `role: "system"` entries. OpenAI supports
    /// multiple system messages, so no repositioning/semantic transform is
    /// needed here.
    pub fn transform_request(&self, request: &Request) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| message_to_json(m))
            .collect();

        let mut body = json!({
            "model": request
                .parameters
                .as_ref()
                .and_then(|p| p.model.clone())
                .or_else(|| self.config.common.default_model.clone())
                .unwrap_or_else(|| "gpt-4".to_string()),
            "messages": messages,
            "stream": request.stream,
        });

        if let Some(params) = &request.parameters {
            let obj = body.as_object_mut().unwrap();
            if let Some(t) = params.temperature {
                obj.insert("temperature".into(), json!(t));
            }
            if let Some(mt) = params.max_tokens {
                obj.insert("max_tokens".into(), json!(mt));
            }
            if let Some(tp) = params.top_p {
                obj.insert("top_p".into(), json!(tp));
            }
            if let Some(fp) = params.frequency_penalty {
                obj.insert("frequency_penalty".into(), json!(fp));
            }
            if let Some(pp) = params.presence_penalty {
                obj.insert("presence_penalty".into(), json!(pp));
            }
            if !params.stop_sequences.is_empty() {
                obj.insert("stop".into(), json!(params.stop_sequences));
            }
            if let Some(seed) = params.seed {
                obj.insert("seed".into(), json!(seed));
            }
            if let Some(user) = &params.user {
                obj.insert("user".into(), json!(user));
            }
            for (k, v) in &params.custom {
                obj.insert(k.clone(), v.clone());
            }
        }
        body
    }

    /// Pure transform: OpenAI chat-completions JSON response → IR response.
    pub fn transform_response(
        &self,
        raw: &Value,
        mut metadata: Metadata,
        latency_ms: u64,
    ) -> GatewayResult<Response> {
        let choice = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| GatewayError::adapter_conversion_error("missing choices[0]"))?;
        let message = choice
            .get("message")
            .ok_or_else(|| GatewayError::adapter_conversion_error("missing choices[0].message"))?;
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(map_finish_reason)
            .unwrap_or(FinishReason::Stop);

        let usage = raw.get("usage").map(|u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            completion_tokens: u
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        });

        metadata.provenance.backend = Some(self.name().to_string());
        metadata.set_latency_ms(latency_ms);

        Ok(Response {
            message: Message::assistant(Content::Text(content)),
            finish_reason,
            usage,
            metadata,
            raw: Some(raw.clone()),
        })
    }
}

pub(crate) fn message_to_json(m: &Message) -> Value {
    let content = match &m.content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => {
            let rendered: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    crate::ir::ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    crate::ir::ContentPart::Image { source } => match source {
                        crate::ir::ImageSource::Url { url } => {
                            json!({"type": "image_url", "image_url": {"url": url}})
                        }
                        crate::ir::ImageSource::Base64 { media_type, data } => json!({
                            "type": "image_url",
                            "image_url": {"url": format!("data:{media_type};base64,{data}")}
                        }),
                    },
                    crate::ir::ContentPart::ToolUse { id, name, input } => {
                        json!({"type": "tool_use", "id": id, "name": name, "input": input})
                    }
                    crate::ir::ContentPart::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => json!({"type": "tool_result", "tool_use_id": tool_use_id, "content": content}),
                })
                .collect();
            json!(rendered)
        }
    };
    let mut obj = json!({
        "role": role_str(m.role),
        "content": content,
    });
    if let Some(name) = &m.name {
        obj.as_object_mut()
            .unwrap()
            .insert("name".into(), json!(name));
    }
    obj
}

pub(crate) fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub(crate) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl BackendAdapter for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn execute(&self, request: Request) -> GatewayResult<Response> {
        let metadata = request.metadata.clone();
        let body = self.transform_request(&request);

        let url = format!("{}/chat/completions", self.config.base_url());
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.common.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }
        for (k, v) in &self.config.common.headers {
            req = req.header(k, v);
        }

        let start = Instant::now();
        let resp = req
            .send()
            .await
            .map_err(|e| network_error(&e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| network_error(&e))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(GatewayError::from_http(status.as_u16(), status.as_str(), &text)
                .with_provenance(crate::ir::Provenance {
                    backend: Some(self.name().to_string()),
                    ..Default::default()
                }));
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::stream_parse_error(format!("invalid JSON body: {e}")))?;
        self.transform_response(&raw, metadata, latency_ms)
    }

    async fn execute_stream(&self, request: Request) -> GatewayResult<ChunkStream> {
        let mut body = self.transform_request(&request);
        body.as_object_mut().unwrap().insert("stream".into(), json!(true));

        let url = format!("{}/chat/completions", self.config.base_url());
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.common.api_key {
            req = req.bearer_auth(key);
        }
        for (k, v) in &self.config.common.headers {
            req = req.header(k, v);
        }

        let resp = req.send().await.map_err(|e| network_error(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_http(status.as_u16(), status.as_str(), &text));
        }

        let parser = OpenAiStreamParser::new(
            request.metadata.clone(),
            self.name().to_string(),
            request.stream_mode,
        );
        Ok(parser.into_stream(resp.bytes_stream()))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.config.base_url());
        let mut req = self.client.get(&url);
        if let Some(key) = &self.config.common.api_key {
            req = req.bearer_auth(key);
        }
        matches!(req.send().await, Ok(resp) if resp.status().is_success())
    }

    async fn list_models(&self) -> GatewayResult<ModelListResult> {
        Ok(ModelListResult {
            models: vec![
                ModelInfo {
                    id: "gpt-4".to_string(),
                    display_name: Some("GPT-4".to_string()),
                    max_context_tokens: Some(8192),
                },
                ModelInfo {
                    id: "gpt-4o".to_string(),
                    display_name: Some("GPT-4o".to_string()),
                    max_context_tokens: Some(128_000),
                },
                ModelInfo {
                    id: "gpt-3.5-turbo".to_string(),
                    display_name: Some("GPT-3.5 Turbo".to_string()),
                    max_context_tokens: Some(16_385),
                },
            ],
            source: ModelSource::Static,
            fetched_at: chrono::Utc::now(),
            is_complete: true,
        })
    }
}

fn network_error(e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::new(crate::error::ErrorCode::ConnectionTimeout, e.to_string())
    } else {
        GatewayError::new(crate::error::ErrorCode::NetworkError, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Metadata, Parameters};

    fn backend() -> OpenAiBackend {
        OpenAiBackend::new(OpenAiConfig::default()).unwrap()
    }

    #[test]
    fn transforms_system_message_inline() {
        let b = backend();
        let mut req = Request::new(
            vec![Message::system("be terse"), Message::user("2+2?")],
            Metadata::new("req-1"),
        );
        req.parameters = Some(Parameters {
            model: Some("gpt-4".into()),
            max_tokens: Some(16),
            temperature: Some(0.7),
            ..Default::default()
        });
        let body = b.transform_request(&req);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 16);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be terse");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn transforms_response_with_usage() {
        let b = backend();
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "4"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let resp = b
            .transform_response(&raw, Metadata::new("req-1"), 42)
            .unwrap();
        assert_eq!(resp.message.content.as_text(), "4");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
        assert_eq!(resp.usage.unwrap().total_tokens, 12);
        assert_eq!(resp.metadata.custom_latency_ms(), Some(42));
    }
}

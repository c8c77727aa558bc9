use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

use super::config::AnthropicConfig;
use super::streaming::AnthropicStreamParser;
use crate::backends::{BackendAdapter, ChunkStream, ModelInfo, ModelListResult, ModelSource};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Capabilities, Content, ContentPart, Fidelity, FinishReason, ImageSource, Message, Metadata,
    Request, Response, Role, SemanticTransform, SystemMessageStrategy, TemperatureRange,
    TokenUsage,
};

const NATIVE_TEMPERATURE_RANGE: TemperatureRange = TemperatureRange { min: 0.0, max: 1.0 };

#[derive(Debug)]
pub struct AnthropicBackend {
    config: AnthropicConfig,
    client: reqwest::Client,
    capabilities: Capabilities,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.common.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        let mut capabilities = Capabilities::minimal(SystemMessageStrategy::SeparateParameter);
        capabilities.tools = true;
        capabilities.multi_modal = true;
        capabilities.supports_multiple_system_messages = false;
        capabilities.supports_top_k = true;
        capabilities.supports_frequency_penalty = false;
        capabilities.supports_presence_penalty = false;
        capabilities.max_stop_sequences = Some(8);
        capabilities.temperature_range = Some(NATIVE_TEMPERATURE_RANGE);
        Ok(Self {
            config,
            client,
            capabilities,
        })
    }

    /// Pure transform: IR request → Anthropic Messages API JSON body.
    ///
    /// Anthropic's `separate-parameter` system-message strategy means every
    /// system message is lifted out of `messages` into a single top-level
    /// `system` string; Anthropic accepts only one, so multiple system
    /// messages are joined and the join is recorded as a semantic
    /// transform.
    pub fn transform_request(&self, request: &Request) -> (Value, Metadata) {
        let mut metadata = request.metadata.clone();
        let system_messages: Vec<&Message> = request.system_messages().collect();
        let system_text = if system_messages.len() > 1 {
            let joined = system_messages
                .iter()
                .map(|m| m.content.as_text())
                .collect::<Vec<_>>()
                .join("\n\n");
            metadata = metadata.with_semantic_transform(SemanticTransform {
                parameter: "system".to_string(),
                original_value: json!(system_messages.len()),
                transformed_value: json!(1),
                reason: "anthropic accepts a single system parameter; messages were concatenated"
                    .to_string(),
                fidelity: Fidelity::Approximate,
            });
            Some(joined)
        } else {
            system_messages.first().map(|m| m.content.as_text())
        };

        let messages: Vec<Value> = request
            .non_system_messages()
            .map(message_to_json)
            .collect();

        let mut body = json!({
            "model": request
                .parameters
                .as_ref()
                .and_then(|p| p.model.clone())
                .or_else(|| self.config.common.default_model.clone())
                .unwrap_or_else(|| "claude-3-5-sonnet-20241022".to_string()),
            "messages": messages,
            "max_tokens": request
                .parameters
                .as_ref()
                .and_then(|p| p.max_tokens)
                .unwrap_or(4096),
            "stream": request.stream,
        });
        if let Some(system) = system_text {
            body.as_object_mut()
                .unwrap()
                .insert("system".into(), json!(system));
        }

        if let Some(params) = &request.parameters {
            let obj = body.as_object_mut().unwrap();
            if let Some(t) = params.temperature {
                let scaled = scale_temperature(t);
                if scaled != t {
                    metadata = metadata.with_semantic_transform(SemanticTransform {
                        parameter: "temperature".to_string(),
                        original_value: json!(t),
                        transformed_value: json!(scaled),
                        reason: "rescaled from the unified 0..2 range to anthropic's 0..1 range"
                            .to_string(),
                        fidelity: Fidelity::Approximate,
                    });
                }
                obj.insert("temperature".into(), json!(scaled));
            }
            if let Some(tp) = params.top_p {
                obj.insert("top_p".into(), json!(tp));
            }
            if let Some(tk) = params.top_k {
                obj.insert("top_k".into(), json!(tk));
            }
            if !params.stop_sequences.is_empty() {
                obj.insert("stop_sequences".into(), json!(params.stop_sequences));
            }
            for (k, v) in &params.custom {
                obj.insert(k.clone(), v.clone());
            }
        }
        if !self.config.beta_headers.is_empty() {
            metadata
                .custom
                .insert("anthropic_beta".to_string(), json!(self.config.beta_headers));
        }
        (body, metadata)
    }

    pub fn transform_response(
        &self,
        raw: &Value,
        mut metadata: Metadata,
        latency_ms: u64,
    ) -> GatewayResult<Response> {
        let content_blocks = raw
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::adapter_conversion_error("missing content array"))?;
        let text: String = content_blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");

        let finish_reason = raw
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(map_finish_reason)
            .unwrap_or(FinishReason::Stop);

        let usage = raw.get("usage").map(|u| {
            let prompt = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            let completion = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            TokenUsage::new(prompt, completion)
        });

        metadata.provenance.backend = Some(self.name().to_string());
        metadata.set_latency_ms(latency_ms);

        Ok(Response {
            message: Message::assistant(Content::Text(text)),
            finish_reason,
            usage,
            metadata,
            raw: Some(raw.clone()),
        })
    }
}

fn scale_temperature(unified: f32) -> f32 {
    (unified / 2.0).clamp(NATIVE_TEMPERATURE_RANGE.min, NATIVE_TEMPERATURE_RANGE.max)
}

fn message_to_json(m: &Message) -> Value {
    let content = match &m.content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => json!(parts.iter().map(content_part_to_json).collect::<Vec<_>>()),
    };
    json!({ "role": role_str(m.role), "content": content })
}

fn content_part_to_json(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({"type": "text", "text": text}),
        ContentPart::Image { source } => match source {
            ImageSource::Url { url } => json!({
                "type": "image",
                "source": {"type": "url", "url": url}
            }),
            ImageSource::Base64 { media_type, data } => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data}
            }),
        },
        ContentPart::ToolUse { id, name, input } => {
            json!({"type": "tool_use", "id": id, "name": name, "input": input})
        }
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let mut v = json!({"type": "tool_result", "tool_use_id": tool_use_id, "content": content});
            if let Some(err) = is_error {
                v.as_object_mut().unwrap().insert("is_error".into(), json!(err));
            }
            v
        }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User | Role::System => "user",
        Role::Assistant => "assistant",
        Role::Tool => "user",
    }
}

pub(crate) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl BackendAdapter for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn execute(&self, request: Request) -> GatewayResult<Response> {
        let (body, metadata) = self.transform_request(&request);
        let url = format!("{}/messages", self.config.base_url());
        let req = self.build_request(&url, &body)?;

        let start = Instant::now();
        let resp = req.send().await.map_err(|e| network_error(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| network_error(&e))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(
                GatewayError::from_http(status.as_u16(), status.as_str(), &text).with_provenance(
                    crate::ir::Provenance {
                        backend: Some(self.name().to_string()),
                        ..Default::default()
                    },
                ),
            );
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::stream_parse_error(format!("invalid JSON body: {e}")))?;
        self.transform_response(&raw, metadata, latency_ms)
    }

    async fn execute_stream(&self, request: Request) -> GatewayResult<ChunkStream> {
        let (mut body, metadata) = self.transform_request(&request);
        body.as_object_mut().unwrap().insert("stream".into(), json!(true));
        let url = format!("{}/messages", self.config.base_url());
        let req = self.build_request(&url, &body)?;

        let resp = req.send().await.map_err(|e| network_error(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_http(status.as_u16(), status.as_str(), &text));
        }

        let parser = AnthropicStreamParser::new(metadata, self.name().to_string(), request.stream_mode);
        Ok(parser.into_stream(resp.bytes_stream()))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.config.base_url());
        match self.build_request_get(&url) {
            Ok(req) => matches!(req.send().await, Ok(resp) if resp.status().is_success()),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> GatewayResult<ModelListResult> {
        Ok(ModelListResult {
            models: vec![
                ModelInfo {
                    id: "claude-3-5-sonnet-20241022".to_string(),
                    display_name: Some("Claude 3.5 Sonnet".to_string()),
                    max_context_tokens: Some(200_000),
                },
                ModelInfo {
                    id: "claude-3-opus-20240229".to_string(),
                    display_name: Some("Claude 3 Opus".to_string()),
                    max_context_tokens: Some(200_000),
                },
                ModelInfo {
                    id: "claude-3-haiku-20240307".to_string(),
                    display_name: Some("Claude 3 Haiku".to_string()),
                    max_context_tokens: Some(200_000),
                },
            ],
            source: ModelSource::Static,
            fetched_at: chrono::Utc::now(),
            is_complete: true,
        })
    }
}

impl AnthropicBackend {
    fn build_request(
        &self,
        url: &str,
        body: &Value,
    ) -> GatewayResult<reqwest::RequestBuilder> {
        let mut req = self.client.post(url).json(body);
        req = self.apply_common_headers(req)?;
        Ok(req)
    }

    fn build_request_get(&self, url: &str) -> GatewayResult<reqwest::RequestBuilder> {
        let req = self.client.get(url);
        self.apply_common_headers(req)
    }

    fn apply_common_headers(
        &self,
        mut req: reqwest::RequestBuilder,
    ) -> GatewayResult<reqwest::RequestBuilder> {
        let key = self
            .config
            .common
            .api_key
            .as_ref()
            .ok_or_else(|| GatewayError::new(crate::error::ErrorCode::MissingApiKey, "anthropic api key not configured"))?;
        req = req
            .header("x-api-key", key)
            .header("anthropic-version", &self.config.anthropic_version);
        if !self.config.beta_headers.is_empty() {
            req = req.header("anthropic-beta", self.config.beta_headers.join(","));
        }
        for (k, v) in &self.config.common.headers {
            req = req.header(k, v);
        }
        Ok(req)
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
    use crate::ir::{Metadata as Meta, Parameters};

    fn backend() -> AnthropicBackend {
        AnthropicBackend::new(AnthropicConfig::default()).unwrap()
    }

    #[test]
    fn lifts_system_message_to_separate_parameter() {
        let b = backend();
        let req = Request::new(
            vec![Message::system("Be terse."), Message::user("2+2?")],
            Meta::new("req-1"),
        );
        let (body, _) = b.transform_request(&req);
        assert_eq!(body["system"], "Be terse.");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn merges_multiple_system_messages_and_records_transform() {
        let b = backend();
        let req = Request::new(
            vec![
                Message::system("A"),
                Message::system("B"),
                Message::user("hi"),
            ],
            Meta::new("req-1"),
        );
        let (body, metadata) = b.transform_request(&req);
        assert_eq!(body["system"], "A\n\nB");
        assert_eq!(metadata.warnings.len(), 1);
    }

    #[test]
    fn scales_temperature_into_native_range() {
        let b = backend();
        let mut req = Request::new(vec![Message::user("hi")], Meta::new("req-1"));
        req.parameters = Some(Parameters {
            temperature: Some(2.0),
            ..Default::default()
        });
        let (body, metadata) = b.transform_request(&req);
        assert_eq!(body["temperature"], 1.0);
        assert_eq!(metadata.warnings.len(), 1);
    }

    #[test]
    fn requires_max_tokens_default() {
        let b = backend();
        let req = Request::new(vec![Message::user("hi")], Meta::new("req-1"));
        let (body, _) = b.transform_request(&req);
        assert_eq!(body["max_tokens"], 4096);
    }
}

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

use super::config::GeminiConfig;
use super::streaming::GeminiStreamParser;
use crate::backends::{BackendAdapter, ChunkStream, ModelInfo, ModelListResult, ModelSource};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Capabilities, Content, ContentPart, FinishReason, ImageSource, Message, Metadata, Request,
    Response, Role, SystemMessageStrategy, TokenUsage,
};

#[derive(Debug)]
pub struct GeminiBackend {
    config: GeminiConfig,
    client: reqwest::Client,
    capabilities: Capabilities,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.common.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        let mut capabilities = Capabilities::minimal(SystemMessageStrategy::SystemInstruction);
        capabilities.tools = true;
        capabilities.multi_modal = true;
        capabilities.supports_multiple_system_messages = false;
        capabilities.supports_top_k = true;
        capabilities.supports_frequency_penalty = false;
        capabilities.supports_presence_penalty = false;
        Ok(Self {
            config,
            client,
            capabilities,
        })
    }

    fn endpoint(&self, model: &str, operation: &str) -> String {
        format!(
            "{}/{}/models/{}:{}",
            self.config.base_url(),
            self.config.api_version,
            model,
            operation
        )
    }

    fn model_name(&self, request: &Request) -> String {
        request
            .parameters
            .as_ref()
            .and_then(|p| p.model.clone())
            .or_else(|| self.config.common.default_model.clone())
            .unwrap_or_else(|| "gemini-1.5-pro".to_string())
    }

    /// Pure transform: IR request → Gemini `generateContent` JSON body.
    ///
    /// Gemini's `system-instruction` strategy lifts system messages into a
    /// top-level `systemInstruction` part; Gemini supports only one, so
    /// (like Anthropic) multiple system messages are joined without a
    /// recorded semantic transform here since the more consequential drift
    /// this adapter documents is sampling parameters moving under a nested
    /// `generationConfig` object (temperature/top_p/top_k/stop all move
    /// there instead of staying top-level).
    pub fn transform_request(&self, request: &Request) -> Value {
        let system_text: Vec<String> = request
            .system_messages()
            .map(|m| m.content.as_text())
            .collect();

        let contents: Vec<Value> = request
            .non_system_messages()
            .map(message_to_json)
            .collect();

        let mut body = json!({ "contents": contents });

        if !system_text.is_empty() {
            body.as_object_mut().unwrap().insert(
                "systemInstruction".into(),
                json!({ "parts": [{ "text": system_text.join("\n\n") }] }),
            );
        }

        if let Some(params) = &request.parameters {
            let mut generation_config = json!({});
            let gc = generation_config.as_object_mut().unwrap();
            if let Some(t) = params.temperature {
                gc.insert("temperature".into(), json!(t));
            }
            if let Some(mt) = params.max_tokens {
                gc.insert("maxOutputTokens".into(), json!(mt));
            }
            if let Some(tp) = params.top_p {
                gc.insert("topP".into(), json!(tp));
            }
            if let Some(tk) = params.top_k {
                gc.insert("topK".into(), json!(tk));
            }
            if !params.stop_sequences.is_empty() {
                gc.insert("stopSequences".into(), json!(params.stop_sequences));
            }
            if !gc.is_empty() {
                body.as_object_mut()
                    .unwrap()
                    .insert("generationConfig".into(), generation_config);
            }
            for (k, v) in &params.custom {
                body.as_object_mut().unwrap().insert(k.clone(), v.clone());
            }
        }
        body
    }

    pub fn transform_response(
        &self,
        raw: &Value,
        mut metadata: Metadata,
        latency_ms: u64,
    ) -> GatewayResult<Response> {
        let (text, reason) = parse_candidate_text(raw)
            .ok_or_else(|| GatewayError::adapter_conversion_error("missing candidates[0]"))?;
        let finish_reason = reason
            .as_deref()
            .map(map_finish_reason)
            .unwrap_or(FinishReason::Stop);
        let usage = parse_usage(raw);

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

/// Extracts `candidates[0]`'s concatenated text parts and `finishReason`,
/// shared between the non-stream and stream parsers since every streamed
/// element is itself a (partial) `GenerateContentResponse`.
pub(crate) fn parse_candidate_text(raw: &Value) -> Option<(String, Option<String>)> {
    let candidate = raw.get("candidates").and_then(|c| c.get(0))?;
    let text = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let reason = candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some((text, reason))
}

pub(crate) fn parse_usage(raw: &Value) -> Option<TokenUsage> {
    let u = raw.get("usageMetadata")?;
    let prompt = u
        .get("promptTokenCount")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let completion = u
        .get("candidatesTokenCount")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    Some(TokenUsage::new(prompt, completion))
}

fn message_to_json(m: &Message) -> Value {
    let parts: Vec<Value> = match &m.content {
        Content::Text(text) => vec![json!({ "text": text })],
        Content::Parts(parts) => parts.iter().map(content_part_to_json).collect(),
    };
    json!({ "role": gemini_role(m.role), "parts": parts })
}

fn content_part_to_json(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "text": text }),
        ContentPart::Image { source } => match source {
            ImageSource::Url { url } => json!({ "fileData": { "fileUri": url } }),
            ImageSource::Base64 { media_type, data } => json!({
                "inlineData": { "mimeType": media_type, "data": data }
            }),
        },
        ContentPart::ToolUse { name, input, .. } => {
            json!({ "functionCall": { "name": name, "args": input } })
        }
        ContentPart::ToolResult { content, .. } => {
            json!({ "functionResponse": { "response": content } })
        }
    }
}

/// Gemini has no `system` role on messages (system content is lifted to
/// `systemInstruction`) and no `tool` role — tool results are modeled as
/// `function` role turns.
fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User | Role::System => "user",
        Role::Assistant => "model",
        Role::Tool => "function",
    }
}

pub(crate) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl BackendAdapter for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn execute(&self, request: Request) -> GatewayResult<Response> {
        let metadata = request.metadata.clone();
        let body = self.transform_request(&request);
        let model = self.model_name(&request);
        let url = self.endpoint(&model, "generateContent");

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.common.api_key {
            req = req.query(&[("key", key.as_str())]);
        }
        for (k, v) in &self.config.common.headers {
            req = req.header(k, v);
        }

        tracing::debug!(backend = self.name(), model, "dispatching gemini request");
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
        let body = self.transform_request(&request);
        let model = self.model_name(&request);
        let url = self.endpoint(&model, "streamGenerateContent");

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.common.api_key {
            req = req.query(&[("key", key.as_str())]);
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

        let parser = GeminiStreamParser::new(request.metadata.clone(), self.name().to_string(), request.stream_mode);
        Ok(parser.into_stream(resp.bytes_stream()))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/{}/models", self.config.base_url(), self.config.api_version);
        let mut req = self.client.get(&url);
        if let Some(key) = &self.config.common.api_key {
            req = req.query(&[("key", key.as_str())]);
        }
        matches!(req.send().await, Ok(resp) if resp.status().is_success())
    }

    async fn list_models(&self) -> GatewayResult<ModelListResult> {
        Ok(ModelListResult {
            models: vec![
                ModelInfo {
                    id: "gemini-1.5-pro".to_string(),
                    display_name: Some("Gemini 1.5 Pro".to_string()),
                    max_context_tokens: Some(2_000_000),
                },
                ModelInfo {
                    id: "gemini-1.5-flash".to_string(),
                    display_name: Some("Gemini 1.5 Flash".to_string()),
                    max_context_tokens: Some(1_000_000),
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
    use crate::ir::Metadata as Meta;

    fn backend() -> GeminiBackend {
        GeminiBackend::new(GeminiConfig::default()).unwrap()
    }

    #[test]
    fn lifts_system_message_to_system_instruction() {
        let b = backend();
        let req = Request::new(
            vec![Message::system("Be terse."), Message::user("2+2?")],
            Meta::new("req-1"),
        );
        let body = b.transform_request(&req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn nests_sampling_params_under_generation_config() {
        let b = backend();
        let mut req = Request::new(vec![Message::user("hi")], Meta::new("req-1"));
        req.parameters = Some(crate::ir::Parameters {
            temperature: Some(1.2),
            max_tokens: Some(256),
            ..Default::default()
        });
        let body = b.transform_request(&req);
        assert_eq!(body["generationConfig"]["temperature"], 1.2);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn maps_finish_reasons() {
        assert_eq!(map_finish_reason("STOP"), FinishReason::Stop);
        assert_eq!(map_finish_reason("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(map_finish_reason("SAFETY"), FinishReason::ContentFilter);
    }

    #[test]
    fn parses_response_text_and_usage() {
        let b = backend();
        let raw = json!({
            "candidates": [{
                "content": {"parts": [{"text": "4"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 1}
        });
        let resp = b.transform_response(&raw, Meta::new("req-1"), 10).unwrap();
        assert_eq!(resp.message.content.as_text(), "4");
        assert_eq!(resp.usage.unwrap().total_tokens, 6);
    }
}

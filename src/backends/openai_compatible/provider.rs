use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

use super::config::OpenAiCompatibleConfig;
use crate::backends::openai::provider::{map_finish_reason, message_to_json};
use crate::backends::openai::streaming::OpenAiStreamParser;
use crate::backends::{BackendAdapter, ChunkStream, ModelInfo, ModelListResult, ModelSource};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Capabilities, Content, FinishReason, Message, Metadata, Request, Response,
    SystemMessageStrategy, TokenUsage,
};

/// Backend for providers that speak the OpenAI chat-completions wire format
/// unchanged — Mistral and Groq. Reuses the OpenAI request/response shape
/// and SSE parser directly rather than re-deriving them, since the wire
/// contract genuinely is the same.
#[derive(Debug)]
pub struct OpenAiCompatibleBackend {
    config: OpenAiCompatibleConfig,
    client: reqwest::Client,
    capabilities: Capabilities,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: OpenAiCompatibleConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.common.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        let mut capabilities = Capabilities::minimal(SystemMessageStrategy::InMessages);
        capabilities.tools = config.provider_name == "groq";
        capabilities.supports_frequency_penalty = true;
        capabilities.supports_presence_penalty = true;
        Ok(Self {
            config,
            client,
            capabilities,
        })
    }

    pub fn transform_request(&self, request: &Request) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_json).collect();

        let mut body = json!({
            "model": request
                .parameters
                .as_ref()
                .and_then(|p| p.model.clone())
                .or_else(|| self.config.common.default_model.clone()),
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
            if !params.stop_sequences.is_empty() {
                obj.insert("stop".into(), json!(params.stop_sequences));
            }
            if let Some(seed) = params.seed {
                obj.insert("seed".into(), json!(seed));
            }
            for (k, v) in &params.custom {
                obj.insert(k.clone(), v.clone());
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

#[async_trait]
impl BackendAdapter for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.config.provider_name
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
        for (k, v) in &self.config.common.headers {
            req = req.header(k, v);
        }

        let start = Instant::now();
        let resp = req.send().await.map_err(|e| network_error(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| network_error(&e))?;
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
        let default = self
            .config
            .common
            .default_model
            .clone()
            .unwrap_or_else(|| "default".to_string());
        Ok(ModelListResult {
            models: vec![ModelInfo {
                id: default.clone(),
                display_name: Some(default),
                max_context_tokens: None,
            }],
            source: ModelSource::Static,
            fetched_at: chrono::Utc::now(),
            is_complete: false,
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
    use crate::ir::{Metadata as Meta, Parameters};

    #[test]
    fn mistral_transform_request_carries_model_and_messages() {
        let b = OpenAiCompatibleBackend::new(OpenAiCompatibleConfig::mistral()).unwrap();
        let mut req = Request::new(vec![Message::user("hi")], Meta::new("req-1"));
        req.parameters = Some(Parameters {
            temperature: Some(0.3),
            ..Default::default()
        });
        let body = b.transform_request(&req);
        assert_eq!(body["model"], "mistral-large-latest");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["temperature"], 0.3);
    }

    #[test]
    fn groq_name_is_provider_name() {
        let b = OpenAiCompatibleBackend::new(OpenAiCompatibleConfig::groq()).unwrap();
        assert_eq!(b.name(), "groq");
    }
}

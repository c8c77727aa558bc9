use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

use super::config::OllamaConfig;
use super::streaming::OllamaStreamParser;
use crate::backends::{BackendAdapter, ChunkStream, ModelInfo, ModelListResult, ModelSource};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Capabilities, Content, FinishReason, Message, Metadata, Request, Response, Role,
    SystemMessageStrategy, TokenUsage,
};

#[derive(Debug)]
pub struct OllamaBackend {
    config: OllamaConfig,
    client: reqwest::Client,
    capabilities: Capabilities,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.common.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        let mut capabilities = Capabilities::minimal(SystemMessageStrategy::InMessages);
        capabilities.multi_modal = true;
        capabilities.supports_top_k = true;
        capabilities.max_context_tokens = None;
        Ok(Self {
            config,
            client,
            capabilities,
        })
    }

    /// Pure transform: IR request → Ollama `/api/chat` JSON body.
    ///
    /// Ollama keeps system messages inline like OpenAI, but nests sampling
    /// parameters under an `options` object rather than at the top level.
    pub fn transform_request(&self, request: &Request) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": role_str(m.role),
                    "content": m.content.as_text(),
                })
            })
            .collect();

        let mut body = json!({
            "model": request
                .parameters
                .as_ref()
                .and_then(|p| p.model.clone())
                .or_else(|| self.config.common.default_model.clone())
                .unwrap_or_else(|| "llama3".to_string()),
            "messages": messages,
            "stream": request.stream,
        });

        if let Some(params) = &request.parameters {
            let mut options = json!({});
            let opts = options.as_object_mut().unwrap();
            if let Some(t) = params.temperature {
                opts.insert("temperature".into(), json!(t));
            }
            if let Some(tp) = params.top_p {
                opts.insert("top_p".into(), json!(tp));
            }
            if let Some(tk) = params.top_k {
                opts.insert("top_k".into(), json!(tk));
            }
            if let Some(seed) = params.seed {
                opts.insert("seed".into(), json!(seed));
            }
            if !params.stop_sequences.is_empty() {
                opts.insert("stop".into(), json!(params.stop_sequences));
            }
            if let Some(mt) = params.max_tokens {
                opts.insert("num_predict".into(), json!(mt));
            }
            if !opts.is_empty() {
                body.as_object_mut().unwrap().insert("options".into(), options);
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
        let text = raw
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::adapter_conversion_error("missing message.content"))?
            .to_string();

        let usage = TokenUsage::new(
            raw.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0) as u32,
            raw.get("eval_count").and_then(Value::as_u64).unwrap_or(0) as u32,
        );

        metadata.provenance.backend = Some(self.name().to_string());
        metadata.set_latency_ms(latency_ms);

        Ok(Response {
            message: Message::assistant(Content::Text(text)),
            finish_reason: FinishReason::Stop,
            usage: Some(usage),
            metadata,
            raw: Some(raw.clone()),
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl BackendAdapter for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn execute(&self, request: Request) -> GatewayResult<Response> {
        let metadata = request.metadata.clone();
        let mut body = self.transform_request(&request);
        body.as_object_mut().unwrap().insert("stream".into(), json!(false));

        let url = format!("{}/api/chat", self.config.base_url());
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.common.api_key {
            req = req.bearer_auth(key);
        }
        for (k, v) in &self.config.common.headers {
            req = req.header(k, v);
        }

        tracing::debug!(backend = self.name(), "dispatching ollama request");
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

        let url = format!("{}/api/chat", self.config.base_url());
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

        let parser = OllamaStreamParser::new(request.metadata.clone(), self.name().to_string(), request.stream_mode);
        Ok(parser.into_stream(resp.bytes_stream()))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url());
        matches!(self.client.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }

    async fn list_models(&self) -> GatewayResult<ModelListResult> {
        let url = format!("{}/api/tags", self.config.base_url());
        let resp = self.client.get(&url).send().await;
        if let Ok(resp) = resp {
            if resp.status().is_success() {
                if let Ok(raw) = resp.json::<Value>().await {
                    if let Some(models) = raw.get("models").and_then(Value::as_array) {
                        let models: Vec<ModelInfo> = models
                            .iter()
                            .filter_map(|m| m.get("name").and_then(Value::as_str))
                            .map(|name| ModelInfo {
                                id: name.to_string(),
                                display_name: Some(name.to_string()),
                                max_context_tokens: None,
                            })
                            .collect();
                        return Ok(ModelListResult {
                            models,
                            source: ModelSource::Remote,
                            fetched_at: chrono::Utc::now(),
                            is_complete: true,
                        });
                    }
                }
            }
        }
        Ok(ModelListResult {
            models: vec![ModelInfo {
                id: "llama3".to_string(),
                display_name: Some("Llama 3".to_string()),
                max_context_tokens: Some(8192),
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
    use crate::ir::Metadata as Meta;

    fn backend() -> OllamaBackend {
        OllamaBackend::new(OllamaConfig::default()).unwrap()
    }

    #[test]
    fn nests_sampling_params_under_options() {
        let b = backend();
        let mut req = Request::new(vec![Message::user("hi")], Meta::new("req-1"));
        req.parameters = Some(crate::ir::Parameters {
            temperature: Some(0.5),
            top_k: Some(40),
            ..Default::default()
        });
        let body = b.transform_request(&req);
        assert_eq!(body["options"]["temperature"], 0.5);
        assert_eq!(body["options"]["top_k"], 40);
    }

    #[test]
    fn transforms_response_with_eval_counts() {
        let b = backend();
        let raw = json!({
            "message": {"role": "assistant", "content": "hi there"},
            "done": true,
            "prompt_eval_count": 8,
            "eval_count": 3
        });
        let resp = b.transform_response(&raw, Meta::new("req-1"), 5).unwrap();
        assert_eq!(resp.message.content.as_text(), "hi there");
        assert_eq!(resp.usage.unwrap().total_tokens, 11);
    }
}

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

use super::config::CohereConfig;
use super::streaming::CohereStreamParser;
use crate::backends::{BackendAdapter, ChunkStream, ModelInfo, ModelListResult, ModelSource};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{
    Capabilities, Content, Fidelity, FinishReason, Message, Metadata, Request, Response, Role,
    SemanticTransform, SystemMessageStrategy, TokenUsage,
};

#[derive(Debug)]
pub struct CohereBackend {
    config: CohereConfig,
    client: reqwest::Client,
    capabilities: Capabilities,
}

impl CohereBackend {
    pub fn new(config: CohereConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.common.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        let mut capabilities = Capabilities::minimal(SystemMessageStrategy::SeparateParameter);
        capabilities.supports_multiple_system_messages = false;
        capabilities.supports_frequency_penalty = true;
        capabilities.supports_presence_penalty = true;
        Ok(Self {
            config,
            client,
            capabilities,
        })
    }

    /// Pure transform: IR request → Cohere `/chat` JSON body.
    ///
    /// Cohere's shape is the most structurally distinct of the supported
    /// providers: instead of a flat `messages` array it splits the
    /// conversation into a trailing `message` (the final user turn) plus a
    /// `chat_history` of prior USER/CHATBOT turns, with system content
    /// lifted into a separate `preamble` string — so this adapter does its
    /// own message-list partitioning rather than a 1:1 per-message map.
    pub fn transform_request(&self, request: &Request) -> (Value, Metadata) {
        let mut metadata = request.metadata.clone();
        let system_messages: Vec<&Message> = request.system_messages().collect();
        let preamble = if system_messages.len() > 1 {
            let joined = system_messages
                .iter()
                .map(|m| m.content.as_text())
                .collect::<Vec<_>>()
                .join("\n\n");
            metadata = metadata.with_semantic_transform(SemanticTransform {
                parameter: "preamble".to_string(),
                original_value: json!(system_messages.len()),
                transformed_value: json!(1),
                reason: "cohere accepts a single preamble; messages were concatenated"
                    .to_string(),
                fidelity: Fidelity::Approximate,
            });
            Some(joined)
        } else {
            system_messages.first().map(|m| m.content.as_text())
        };

        let conversational: Vec<&Message> = request.non_system_messages().collect();
        let (history, last) = conversational.split_at(conversational.len().saturating_sub(1));
        let chat_history: Vec<Value> = history
            .iter()
            .map(|m| {
                json!({
                    "role": cohere_role(m.role),
                    "message": m.content.as_text(),
                })
            })
            .collect();
        let message = last
            .first()
            .map(|m| m.content.as_text())
            .unwrap_or_default();

        let mut body = json!({
            "model": request
                .parameters
                .as_ref()
                .and_then(|p| p.model.clone())
                .or_else(|| self.config.common.default_model.clone())
                .unwrap_or_else(|| "command-r-plus".to_string()),
            "message": message,
            "chat_history": chat_history,
            "stream": request.stream,
        });
        if let Some(preamble) = preamble {
            body.as_object_mut()
                .unwrap()
                .insert("preamble".into(), json!(preamble));
        }

        if let Some(params) = &request.parameters {
            let obj = body.as_object_mut().unwrap();
            if let Some(t) = params.temperature {
                obj.insert("temperature".into(), json!(t));
            }
            if let Some(mt) = params.max_tokens {
                obj.insert("max_tokens".into(), json!(mt));
            }
            if let Some(tp) = params.top_p {
                obj.insert("p".into(), json!(tp));
            }
            if let Some(tk) = params.top_k {
                obj.insert("k".into(), json!(tk));
            }
            if let Some(fp) = params.frequency_penalty {
                obj.insert("frequency_penalty".into(), json!(fp));
            }
            if let Some(pp) = params.presence_penalty {
                obj.insert("presence_penalty".into(), json!(pp));
            }
            if !params.stop_sequences.is_empty() {
                obj.insert("stop_sequences".into(), json!(params.stop_sequences));
            }
            for (k, v) in &params.custom {
                obj.insert(k.clone(), v.clone());
            }
        }
        (body, metadata)
    }

    pub fn transform_response(
        &self,
        raw: &Value,
        mut metadata: Metadata,
        latency_ms: u64,
    ) -> GatewayResult<Response> {
        let text = raw
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::adapter_conversion_error("missing text"))?
            .to_string();

        let finish_reason = raw
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(map_finish_reason)
            .unwrap_or(FinishReason::Stop);

        let usage = raw
            .get("meta")
            .and_then(|m| m.get("tokens"))
            .map(|t| {
                let prompt = t.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
                let completion = t.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
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

fn cohere_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "CHATBOT",
        Role::User | Role::Tool | Role::System => "USER",
    }
}

pub(crate) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "COMPLETE" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "ERROR" | "ERROR_TOXIC" => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl BackendAdapter for CohereBackend {
    fn name(&self) -> &str {
        "cohere"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn execute(&self, request: Request) -> GatewayResult<Response> {
        let (body, metadata) = self.transform_request(&request);
        let url = format!("{}/chat", self.config.base_url());
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
        let (mut body, metadata) = self.transform_request(&request);
        body.as_object_mut().unwrap().insert("stream".into(), json!(true));
        let url = format!("{}/chat", self.config.base_url());
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

        let parser = CohereStreamParser::new(metadata, self.name().to_string(), request.stream_mode);
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
                    id: "command-r-plus".to_string(),
                    display_name: Some("Command R+".to_string()),
                    max_context_tokens: Some(128_000),
                },
                ModelInfo {
                    id: "command-r".to_string(),
                    display_name: Some("Command R".to_string()),
                    max_context_tokens: Some(128_000),
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

    fn backend() -> CohereBackend {
        CohereBackend::new(CohereConfig::default()).unwrap()
    }

    #[test]
    fn splits_history_from_trailing_message_and_lifts_preamble() {
        let b = backend();
        let req = Request::new(
            vec![
                Message::system("Be terse."),
                Message::user("hi"),
                Message::assistant("hello"),
                Message::user("2+2?"),
            ],
            Meta::new("req-1"),
        );
        let (body, _) = b.transform_request(&req);
        assert_eq!(body["preamble"], "Be terse.");
        assert_eq!(body["message"], "2+2?");
        assert_eq!(body["chat_history"].as_array().unwrap().len(), 2);
        assert_eq!(body["chat_history"][1]["role"], "CHATBOT");
    }

    #[test]
    fn transforms_response_with_token_usage() {
        let b = backend();
        let raw = json!({
            "text": "4",
            "finish_reason": "COMPLETE",
            "meta": {"tokens": {"input_tokens": 5, "output_tokens": 1}}
        });
        let resp = b.transform_response(&raw, Meta::new("req-1"), 9).unwrap();
        assert_eq!(resp.message.content.as_text(), "4");
        assert_eq!(resp.usage.unwrap().total_tokens, 6);
    }
}

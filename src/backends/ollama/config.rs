use crate::backends::BackendConfig;

/// Ollama-specific configuration. Ollama is typically self-hosted with no
/// authentication, so `common.api_key` is usually `None`; it is still
/// honored as a bearer token when set, for hosted Ollama-compatible
/// deployments.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub common: BackendConfig,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            common: BackendConfig {
                base_url: Some("http://localhost:11434".to_string()),
                default_model: Some("llama3".to_string()),
                ..Default::default()
            },
        }
    }
}

impl OllamaConfig {
    pub fn base_url(&self) -> &str {
        self.common.base_url.as_deref().unwrap_or("http://localhost:11434")
    }
}

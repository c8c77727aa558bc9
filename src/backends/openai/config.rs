use crate::backends::BackendConfig;

/// OpenAI-specific configuration, layering `organization`/`project` over the
/// shared [`BackendConfig`] shape.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub common: BackendConfig,
    pub organization: Option<String>,
    pub project: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            common: BackendConfig {
                base_url: Some("https://api.openai.com/v1".to_string()),
                default_model: Some("gpt-4".to_string()),
                ..Default::default()
            },
            organization: None,
            project: None,
        }
    }
}

impl OpenAiConfig {
    pub fn base_url(&self) -> &str {
        self.common
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
    }
}

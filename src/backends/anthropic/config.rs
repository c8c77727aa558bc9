use crate::backends::BackendConfig;

/// Anthropic-specific configuration: `anthropic_version` and `beta_headers`.
/// Model-capability data lives in IR [`crate::ir::Capabilities`] instead of
/// a provider-private registry.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub common: BackendConfig,
    pub anthropic_version: String,
    pub beta_headers: Vec<String>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            common: BackendConfig {
                base_url: Some("https://api.anthropic.com/v1".to_string()),
                default_model: Some("claude-3-5-sonnet-20241022".to_string()),
                ..Default::default()
            },
            anthropic_version: "2023-06-01".to_string(),
            beta_headers: Vec::new(),
        }
    }
}

impl AnthropicConfig {
    pub fn base_url(&self) -> &str {
        self.common
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com/v1")
    }
}

use crate::backends::BackendConfig;

/// Gemini-specific configuration: API-key-as-query-parameter auth and the
/// `v1beta` path. Model-capability data lives in IR
/// [`crate::ir::Capabilities`] instead of a model registry here.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub common: BackendConfig,
    pub api_version: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            common: BackendConfig {
                base_url: Some("https://generativelanguage.googleapis.com".to_string()),
                default_model: Some("gemini-1.5-pro".to_string()),
                ..Default::default()
            },
            api_version: "v1beta".to_string(),
        }
    }
}

impl GeminiConfig {
    pub fn base_url(&self) -> &str {
        self.common
            .base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com")
    }
}

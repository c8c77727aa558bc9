use crate::backends::BackendConfig;

/// Cohere-specific configuration.
#[derive(Debug, Clone)]
pub struct CohereConfig {
    pub common: BackendConfig,
}

impl Default for CohereConfig {
    fn default() -> Self {
        Self {
            common: BackendConfig {
                base_url: Some("https://api.cohere.com/v1".to_string()),
                default_model: Some("command-r-plus".to_string()),
                ..Default::default()
            },
        }
    }
}

impl CohereConfig {
    pub fn base_url(&self) -> &str {
        self.common
            .base_url
            .as_deref()
            .unwrap_or("https://api.cohere.com/v1")
    }
}

use crate::backends::BackendConfig;

/// Configuration for a provider that speaks the OpenAI chat-completions wire
/// format verbatim (Mistral, Groq). `name`/`default_base_url` distinguish
/// the provider for logging and
/// routing; everything else is the shared [`BackendConfig`] shape.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    pub common: BackendConfig,
    pub provider_name: String,
    pub default_base_url: String,
}

impl OpenAiCompatibleConfig {
    pub fn mistral() -> Self {
        Self {
            common: BackendConfig {
                base_url: Some("https://api.mistral.ai/v1".to_string()),
                default_model: Some("mistral-large-latest".to_string()),
                ..Default::default()
            },
            provider_name: "mistral".to_string(),
            default_base_url: "https://api.mistral.ai/v1".to_string(),
        }
    }

    pub fn groq() -> Self {
        Self {
            common: BackendConfig {
                base_url: Some("https://api.groq.com/openai/v1".to_string()),
                default_model: Some("llama-3.1-70b-versatile".to_string()),
                ..Default::default()
            },
            provider_name: "groq".to_string(),
            default_base_url: "https://api.groq.com/openai/v1".to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.common
            .base_url
            .as_deref()
            .unwrap_or(&self.default_base_url)
    }
}

//! LLM integration for mailgate.
//!
//! The workflow depends only on the capability traits in [`capability`].
//! [`Reasoning`] implements them on top of any [`LlmProvider`]. The bundled
//! provider is rig's OpenAI chat-completions client behind [`RigAdapter`].

pub mod capability;
pub mod provider;
pub mod reasoning;
mod rig_adapter;

pub use capability::{ClassificationInput, Classifier, GenerationRequest, Generator};
pub use provider::*;
pub use reasoning::{Reasoning, extract_json_object};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use rig::providers::openai;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;
        let temperature = match std::env::var("MAILGATE_TEMPERATURE") {
            Ok(raw) => raw.parse::<f32>().map_err(|e| ConfigError::InvalidValue {
                key: "MAILGATE_TEMPERATURE".to_string(),
                message: e.to_string(),
            })?,
            Err(_) => 0.0,
        };
        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            model: std::env::var("MAILGATE_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string()),
            base_url: std::env::var("MAILGATE_LLM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            temperature,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let client: openai::CompletionsClient = openai::CompletionsClient::builder()
        .api_key(config.api_key.expose_secret())
        .base_url(&config.base_url)
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: format!("Failed to create OpenAI client: {e}"),
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!(model = %config.model, base_url = %config.base_url, "Using OpenAI-compatible provider");
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

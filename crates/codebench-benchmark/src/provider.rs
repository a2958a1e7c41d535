use std::sync::Arc;

use async_trait::async_trait;
use codebench_core::{GenerationResult, ProviderConfig};
use serde::{Deserialize, Serialize};

use crate::anthropic::AnthropicProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    /// HTTP status when the failure came from the provider's API.
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<GenerationResult, ProviderError>;
}

/// Per-request credentials; anything missing falls back to the service environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeys {
    #[serde(default)]
    pub anthropic: Option<String>,
    #[serde(default)]
    pub openai: Option<String>,
}

pub trait ProviderResolver: Send + Sync {
    fn resolve(
        &self,
        provider_id: &str,
        model_name: &str,
        api_keys: &ApiKeys,
    ) -> Result<Arc<dyn ModelProvider>, ProviderError>;
}

pub struct DefaultProviderResolver {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl DefaultProviderResolver {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn key(explicit: &Option<String>, fallback: &Option<String>, var: &str) -> Result<String, ProviderError> {
        let usable = |k: &&String| !k.trim().is_empty();
        explicit
            .as_ref()
            .filter(usable)
            .or(fallback.as_ref().filter(usable))
            .cloned()
            .ok_or_else(|| ProviderError::new(format!("{var} not configured")))
    }
}

impl ProviderResolver for DefaultProviderResolver {
    fn resolve(
        &self,
        provider_id: &str,
        model_name: &str,
        api_keys: &ApiKeys,
    ) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        let provider: Arc<dyn ModelProvider> = match provider_id.to_ascii_lowercase().as_str() {
            "anthropic" => {
                let key = Self::key(&api_keys.anthropic, &self.config.anthropic_api_key, "ANTHROPIC_API_KEY")?;
                Arc::new(AnthropicProvider::new(self.client.clone(), key, model_name))
            }
            "openai" => {
                let key = Self::key(&api_keys.openai, &self.config.openai_api_key, "OPENAI_API_KEY")?;
                Arc::new(OpenAiProvider::new(key, model_name))
            }
            "ollama" => Arc::new(OllamaProvider::new(
                self.client.clone(),
                &self.config.ollama_host,
                model_name,
            )),
            other => return Err(ProviderError::new(format!("Unknown provider: {other}"))),
        };

        tracing::debug!("Resolved provider {} for model {}", provider.name(), model_name);
        Ok(provider)
    }
}

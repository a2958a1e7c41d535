use std::time::Instant;

use async_trait::async_trait;
use codebench_core::GenerationResult;
use serde::{Deserialize, Serialize};

use crate::provider::{CompletionRequest, ModelProvider, ProviderError};

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ResponseMessage,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: String,
}

/// Local models served by Ollama's `/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    host: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(client: reqwest::Client, host: &str, model: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    pub async fn chat(&self, prompt: &str, max_tokens: Option<u32>) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/api/chat", self.host);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: max_tokens.map(|n| ChatOptions { num_predict: Some(n) }),
        };

        let resp = self.client.post(&url).json(&request).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::with_status(
                format!("Ollama chat failed: {} - {}", status, body),
                status.as_u16(),
            ));
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(500).collect();
            ProviderError::new(format!("Failed to parse Ollama response: {} - Body: {}", e, preview))
        })
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<GenerationResult, ProviderError> {
        let start = Instant::now();
        let resp = self.chat(&request.prompt, Some(request.max_tokens)).await?;

        Ok(GenerationResult {
            content: resp.message.content,
            input_tokens: resp.prompt_eval_count.unwrap_or(0),
            output_tokens: resp.eval_count.unwrap_or(0),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

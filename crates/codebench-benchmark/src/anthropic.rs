use std::time::Instant;

use async_trait::async_trait;
use codebench_core::GenerationResult;
use serde::{Deserialize, Serialize};

use crate::provider::{CompletionRequest, ModelProvider, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Anthropic Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<GenerationResult, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ProviderError::with_status(
                format!("Anthropic API error {}: {}", status, detail),
                status.as_u16(),
            ));
        }

        let parsed: MessagesResponse = resp.json().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let content = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerationResult {
            content,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "solve".into(),
            max_tokens: 4096,
        }
    }

    #[tokio::test]
    async fn test_text_blocks_and_usage() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "sk-test");
                assert_eq!(headers["anthropic-version"], API_VERSION);
                assert_eq!(body["max_tokens"], 4096);
                assert_eq!(body["messages"][0]["content"], "solve");
                Json(json!({
                    "content": [
                        {"type": "text", "text": "part one "},
                        {"type": "thinking", "thinking": "..."},
                        {"type": "text", "text": "part two"}
                    ],
                    "usage": {"input_tokens": 120, "output_tokens": 48}
                }))
            }),
        );
        let base = serve(router).await;

        let provider = AnthropicProvider::new(reqwest::Client::new(), "sk-test", "claude-sonnet-4-20250514")
            .with_base_url(base);
        let result = provider.complete(request()).await.unwrap();

        assert_eq!(result.content, "part one part two");
        assert_eq!(result.input_tokens, 120);
        assert_eq!(result.output_tokens, 48);
    }

    #[tokio::test]
    async fn test_rate_limit_carries_status() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(router).await;

        let provider = AnthropicProvider::new(reqwest::Client::new(), "k", "m").with_base_url(base);
        let err = provider.complete(request()).await.unwrap_err();
        assert_eq!(err.status, Some(429));
    }
}

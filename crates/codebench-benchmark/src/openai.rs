use std::time::Instant;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};
use async_trait::async_trait;
use codebench_core::GenerationResult;

use crate::provider::{CompletionRequest, ModelProvider, ProviderError};

fn llm_err(e: OpenAIError) -> ProviderError {
    match &e {
        OpenAIError::Reqwest(inner) => match inner.status() {
            Some(status) => ProviderError::with_status(e.to_string(), status.as_u16()),
            None => ProviderError::new(e.to_string()),
        },
        _ => ProviderError::new(e.to_string()),
    }
}

fn extract_content(response: &CreateChatCompletionResponse) -> String {
    response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default()
}

/// Reasoning-era models reject `max_tokens` and take `max_completion_tokens`.
pub fn uses_completion_tokens(model: &str) -> bool {
    ["o1", "o3", "gpt-5"].iter().any(|p| model.starts_with(p))
}

/// OpenAI chat completions.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into());
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[allow(deprecated)]
    async fn complete(&self, request: CompletionRequest) -> Result<GenerationResult, ProviderError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt)
                .build()
                .map_err(llm_err)?,
        )]);

        match uses_completion_tokens(&self.model) {
            true => args.max_completion_tokens(request.max_tokens),
            false => args.max_tokens(request.max_tokens),
        };

        let start = Instant::now();
        let response = self
            .client
            .chat()
            .create(args.build().map_err(llm_err)?)
            .await
            .map_err(llm_err)?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (input_tokens, output_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens as u64, u.completion_tokens as u64))
            .unwrap_or_default();

        Ok(GenerationResult {
            content: extract_content(&response),
            input_tokens,
            output_tokens,
            latency_ms,
        })
    }
}

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;
use tracing::{debug, instrument};

use super::errors::LlmApiError;
use super::retry::RetryPolicy;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, MessagesRequest, MessagesResponse,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LlmConfig, LlmProvider, RetryConfig};
use crate::domain::ports::{Prompt, TextGenerator};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// HTTP client for the configured text-generation provider.
///
/// Anthropic is called through the Messages API, every other provider through
/// the OpenAI-compatible chat completions endpoint.
pub struct LlmClient {
    http_client: ReqwestClient,
    provider: LlmProvider,
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
    retry_policy: RetryPolicy,
}

impl LlmClient {
    /// Build a client from configuration.
    ///
    /// A provider that needs an API key and has none is an environment problem
    /// and is reported before any generation is attempted.
    pub fn from_config(config: &LlmConfig, retry: &RetryConfig) -> DomainResult<Self> {
        let api_key = config.resolved_api_key();
        if api_key.is_none() {
            if let Some(var) = config.provider.api_key_env() {
                return Err(DomainError::EnvironmentMissing(format!(
                    "no API key for provider '{}': set {var} or llm.api_key",
                    config.provider
                )));
            }
        }

        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| DomainError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            provider: config.provider,
            model: config.resolved_model(),
            base_url: config.resolved_base_url(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_policy: RetryPolicy::from(retry),
        })
    }

    async fn send_once(&self, prompt: &Prompt) -> Result<String, LlmApiError> {
        let text = match self.provider {
            LlmProvider::Anthropic => self.send_anthropic(prompt).await?,
            _ => self.send_chat_completion(prompt).await?,
        };

        if text.trim().is_empty() {
            return Err(LlmApiError::EmptyResponse);
        }
        Ok(text)
    }

    async fn send_chat_completion(&self, prompt: &Prompt) -> Result<String, LlmApiError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(prompt.system.clone()),
                ChatMessage::user(prompt.user.clone()),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(LlmApiError::from_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(LlmApiError::from_status(status, body));
        }

        let body = response.text().await.map_err(LlmApiError::from_transport)?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        Ok(parsed.text().unwrap_or_default().to_string())
    }

    async fn send_anthropic(&self, prompt: &Prompt) -> Result<String, LlmApiError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(prompt.system.clone()).filter(|s| !s.is_empty()),
            messages: vec![ChatMessage::user(prompt.user.clone())],
            temperature: self.temperature,
        };

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(LlmApiError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(LlmApiError::from_status(status, body));
        }

        let body = response.text().await.map_err(LlmApiError::from_transport)?;
        let parsed: MessagesResponse = serde_json::from_str(&body)?;
        Ok(parsed.text())
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    fn name(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    #[instrument(skip(self, prompt), fields(provider = %self.provider, model = %self.model))]
    async fn generate(&self, prompt: &Prompt) -> DomainResult<String> {
        let text = self
            .retry_policy
            .execute(|| self.send_once(prompt))
            .await?;
        debug!(chars = text.len(), "provider responded");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn prompt() -> Prompt {
        Prompt {
            system: "You write tests.".to_string(),
            user: "Write a test.".to_string(),
        }
    }

    fn config(provider: LlmProvider, base_url: String) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("test-key".to_string()),
            base_url: Some(base_url),
            model: Some("test-model".to_string()),
            ..Default::default()
        }
    }

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_openai_compatible_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "You write tests."},
                    {"role": "user", "content": "Write a test."}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"[Fact] public void A() {}"}}]}"#)
            .create_async()
            .await;

        let client = LlmClient::from_config(&config(LlmProvider::OpenAi, server.url()), &no_retry()).unwrap();
        let text = client.generate(&prompt()).await.unwrap();

        assert_eq!(text, "[Fact] public void A() {}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anthropic_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "system": "You write tests."
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[{"type":"text","text":"using Xunit;"}]}"#)
            .create_async()
            .await;

        let client =
            LlmClient::from_config(&config(LlmProvider::Anthropic, server.url()), &no_retry()).unwrap();
        assert_eq!(client.generate(&prompt()).await.unwrap(), "using Xunit;");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_answer_is_generation_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"   "}}]}"#)
            .create_async()
            .await;

        let client = LlmClient::from_config(&config(LlmProvider::Groq, server.url()), &no_retry()).unwrap();
        let result = client.generate(&prompt()).await;
        assert!(matches!(result, Err(DomainError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("unavailable")
            .expect(2)
            .create_async()
            .await;

        let client = LlmClient::from_config(
            &config(LlmProvider::OpenRouter, server.url()),
            &RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        )
        .unwrap();

        let result = client.generate(&prompt()).await;
        assert!(matches!(result, Err(DomainError::GenerationFailed(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .expect(1)
            .create_async()
            .await;

        let client = LlmClient::from_config(
            &config(LlmProvider::OpenAi, server.url()),
            &RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        )
        .unwrap();

        let result = client.generate(&prompt()).await;
        match result {
            Err(DomainError::GenerationFailed(message)) => assert!(message.contains("Authentication")),
            other => panic!("expected generation failure, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[test]
    fn test_missing_key_is_environment_missing() {
        temp_env::with_var("OPENAI_API_KEY", None::<&str>, || {
            let config = LlmConfig::default();
            let result = LlmClient::from_config(&config, &RetryConfig::default());
            assert!(matches!(result, Err(DomainError::EnvironmentMissing(_))));
        });
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            ..Default::default()
        };
        let client = LlmClient::from_config(&config, &RetryConfig::default()).unwrap();
        assert_eq!(client.name(), "ollama/llama3.2");
    }
}

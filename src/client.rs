use async_trait::async_trait;
use colored::Colorize;
use dialoguer::Select;
use reqwest::Client;
use std::time::Duration;
use tabled::{settings::Style, Table};

use crate::api_models::{
    ApiErrorResponse, ChatMessage, ContentBlock, MessagesRequest, MessagesResponse, Model,
    ModelDisplay, ModelsResponse, OllamaOptions, OllamaRequest, OllamaResponse, SelectedModel,
};
use crate::tools::errors::{PipelineError, RetryConfig, RetryExecutor};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const LLM_TIMEOUT_SECS: u64 = 180;

/// One single-turn completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: &str, prompt: String) -> Self {
        Self {
            system: system.to_string(),
            prompt,
            max_tokens: 1000,
            temperature: 0.0,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, PipelineError>;
}

fn http_client() -> Result<Client, PipelineError> {
    Client::builder()
        .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
        .build()
        .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {}", e)))
}

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl AnthropicClient {
    pub fn new(base_url: &str, api_key: String, model: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, body: &MessagesRequest) -> Result<String, PipelineError> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                log::warn!("Anthropic API returned {}: {}", status, text);
                return Err(PipelineError::Http {
                    url,
                    status: status.as_u16(),
                });
            }
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| format!("{} ({}): {}", status, e.error.kind, e.error.message))
                .unwrap_or_else(|_| format!("{}: {}", status, text));
            return Err(PipelineError::llm("anthropic", message));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::parse("anthropic response", e))?;

        if let Some(usage) = &parsed.usage {
            log::debug!(
                "anthropic usage: {} input / {} output tokens (stop: {:?})",
                usage.input_tokens,
                usage.output_tokens,
                parsed.stop_reason
            );
        }

        parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| PipelineError::llm("anthropic", "response contained no text block"))
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, PipelineError> {
        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: Some(request.system.clone()).filter(|s| !s.is_empty()),
            messages: vec![ChatMessage::user(&request.prompt)],
        };

        RetryExecutor::new(self.retry.clone())
            .execute(|| self.send_once(&body))
            .await
    }
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, PipelineError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            system: Some(request.system.clone()).filter(|s| !s.is_empty()),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::network(&url, e))?;

        if !response.status().is_success() {
            return Err(PipelineError::llm(
                "ollama",
                format!("API request failed: {}", response.status()),
            ));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::parse("ollama response", e))?;

        if let Some(duration_ns) = parsed.total_duration {
            log::debug!("ollama generation took {:.2}s", duration_ns as f64 / 1_000_000_000.0);
        }

        match parsed.response {
            Some(text) if parsed.done => Ok(text),
            _ => Err(PipelineError::llm("ollama", "generation did not complete")),
        }
    }
}

// Model Selection
pub async fn fetch_models(base_url: &str) -> Result<Vec<Model>, PipelineError> {
    let client = http_client()?;
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| PipelineError::network(&url, e))?;

    if !response.status().is_success() {
        return Err(PipelineError::Http {
            url,
            status: response.status().as_u16(),
        });
    }

    let models_response: ModelsResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::parse("ollama models", e))?;
    Ok(models_response.models)
}

pub fn display_models_table(models: &[Model]) {
    let model_displays: Vec<ModelDisplay> = models.iter().enumerate().map(ModelDisplay::from).collect();

    let mut table = Table::new(model_displays);
    table.with(Style::modern());

    println!("{}", "Available Models:".cyan().bold());
    println!("{}", table);
    println!();
}

pub fn select_model(models: &[Model]) -> anyhow::Result<SelectedModel> {
    if models.is_empty() {
        anyhow::bail!("No models available. Install one with: ollama pull llama3");
    }

    let model_options: Vec<String> = models
        .iter()
        .map(|model| format!("{} ({:.2} GB)", model.name, model.size as f64 / 1_000_000_000.0))
        .collect();

    let selection = Select::new()
        .with_prompt("Select model for your session")
        .items(&model_options)
        .default(0)
        .interact()?;

    Ok(SelectedModel::from(models[selection].clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn anthropic_sends_headers_and_returns_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("x-api-key", "secret")
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json_body_partial(
                        r#"{"model": "claude-test", "max_tokens": 2000, "system": "be brief",
                            "messages": [{"role": "user", "content": "hello"}]}"#,
                    );
                then.status(200).json_body(json!({
                    "content": [{"type": "text", "text": "hi there"}],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 5, "output_tokens": 2}
                }));
            })
            .await;

        let client = AnthropicClient::new(&server.base_url(), "secret".into(), "claude-test")
            .unwrap()
            .with_retry(no_retry());
        let request = CompletionRequest::new("be brief", "hello".into())
            .max_tokens(2000)
            .temperature(0.7);

        assert_eq!(client.complete(&request).await.unwrap(), "hi there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn anthropic_client_errors_carry_api_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(401).json_body(json!({
                    "type": "error",
                    "error": {"type": "authentication_error", "message": "invalid x-api-key"}
                }));
            })
            .await;

        let client = AnthropicClient::new(&server.base_url(), "bad".into(), "claude-test")
            .unwrap()
            .with_retry(no_retry());
        let err = client
            .complete(&CompletionRequest::new("", "hello".into()))
            .await
            .unwrap_err();

        match err {
            PipelineError::Llm { provider, message } => {
                assert_eq!(provider, "anthropic");
                assert!(message.contains("authentication_error"));
                assert!(message.contains("invalid x-api-key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn anthropic_retries_overloaded_responses() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(529);
            })
            .await;

        let client = AnthropicClient::new(&server.base_url(), "k".into(), "claude-test")
            .unwrap()
            .with_retry(RetryConfig {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                jitter: false,
                ..RetryConfig::default()
            });
        let result = client.complete(&CompletionRequest::new("", "hi".into())).await;

        assert!(matches!(result, Err(PipelineError::Http { status: 529, .. })));
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn ollama_generates_without_streaming() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate").json_body_partial(
                    r#"{"model": "llama3", "stream": false, "options": {"num_predict": 64}}"#,
                );
                then.status(200)
                    .json_body(json!({"response": "local answer", "done": true, "total_duration": 1000}));
            })
            .await;

        let client = OllamaClient::new(&server.base_url(), "llama3").unwrap();
        let request = CompletionRequest::new("sys", "q".into()).max_tokens(64);

        assert_eq!(client.complete(&request).await.unwrap(), "local answer");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_models_lists_tags() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({"models": [
                    {"name": "llama3:8b", "size": 4700000000u64, "digest": "abcdef0123456789", "modified_at": "2024-05-01T10:00:00Z"}
                ]}));
            })
            .await;

        let models = fetch_models(&server.base_url()).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "llama3:8b");
    }
}

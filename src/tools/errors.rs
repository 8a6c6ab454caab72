use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Network request failed: {url} - {message}")]
    Network { url: String, message: String },

    #[error("HTTP error from {url}: status {status}")]
    Http { url: String, status: u16 },

    #[error("Request timeout: {url} (timeout: {timeout_ms}ms)")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Language model request failed: {provider} - {message}")]
    Llm { provider: String, message: String },

    #[error("Parse error: {what} - {message}")]
    Parse { what: String, message: String },

    #[error("Search operation failed: {query} - {message}")]
    Search { query: String, message: String },

    #[error("Scrape failed: {url} - {message}")]
    Scrape { url: String, message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Anthropic API key is required. Set ANTHROPIC_API_KEY or add it to the config file.")]
    MissingApiKey,

    #[error("File operation failed: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
    },
}

impl PipelineError {
    pub fn network(url: &str, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            message: source.to_string(),
        }
    }

    pub fn llm(provider: &str, message: impl Into<String>) -> Self {
        Self::Llm {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(what: &str, message: impl ToString) -> Self {
        Self::Parse {
            what: what.to_string(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io {
            message: source.to_string(),
            path,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::Network { .. } => true,
            PipelineError::Timeout { .. } => true,
            PipelineError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            PipelineError::Io { message, path } => {
                let path_str = path
                    .as_ref()
                    .map(|p| format!(" ({})", p.display()))
                    .unwrap_or_default();
                format!("File operation failed{}: {}", path_str, message)
            }
            PipelineError::Network { url, message } => {
                format!("Network request to '{}' failed: {}", url, message)
            }
            PipelineError::Http { url, status } if *status == 429 => {
                format!("Rate limited by '{}'", url)
            }
            PipelineError::Timeout { url, timeout_ms } => {
                format!("'{}' did not answer within {}ms", url, timeout_ms)
            }
            PipelineError::Config { message } => format!("Configuration problem: {}", message),
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `operation` until it succeeds, fails with a non-recoverable
    /// error, or the retry budget is spent.
    pub async fn execute<F, Fut, R>(&self, mut operation: F) -> Result<R, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, PipelineError>>,
    {
        let mut attempts = 0;
        let mut delay = self.config.base_delay;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempts += 1;

                    if attempts > self.config.max_retries || !error.is_recoverable() {
                        return Err(error);
                    }

                    let mut sleep_time = delay;
                    if self.config.jitter {
                        use rand::Rng;
                        let jitter_factor = rand::thread_rng().gen_range(0.8..1.2);
                        sleep_time = Duration::from_millis(
                            ((sleep_time.as_millis() as f64) * jitter_factor) as u64,
                        );
                    }

                    log::debug!(
                        "attempt {} failed ({}), retrying in {}ms",
                        attempts,
                        error,
                        sleep_time.as_millis()
                    );
                    tokio::time::sleep(sleep_time).await;

                    delay = std::cmp::min(
                        Duration::from_millis(
                            ((delay.as_millis() as f64) * self.config.backoff_multiplier) as u64,
                        ),
                        self.config.max_delay,
                    );
                }
            }
        }
    }
}

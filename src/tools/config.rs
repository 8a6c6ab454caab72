use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::errors::PipelineError;
use super::web_search::WebSearchConfig;

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: Provider,
    pub model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub ollama_base_url: String,
    pub num_search_results: usize,
    pub max_context_results: usize,
    pub search: WebSearchConfig,
    pub log_level: String,
    pub history_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic,
            model: DEFAULT_MODEL.to_string(),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            num_search_results: 5,
            max_context_results: 3,
            search: WebSearchConfig::default(),
            log_level: "info".to_string(),
            history_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn data_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("llm-websearch")
    }

    pub fn default_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Missing file means defaults; a file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(path).map_err(|e| PipelineError::io(e, Some(path.to_path_buf())))?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::config(format!("{} is not valid: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io(e, Some(parent.to_path_buf())))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::parse("config", e))?;
        fs::write(path, content).map_err(|e| PipelineError::io(e, Some(path.to_path_buf())))
    }

    pub fn resolve_api_key(&self) -> Result<String, PipelineError> {
        Self::pick_api_key(std::env::var(API_KEY_ENV).ok(), self.anthropic_api_key.clone())
    }

    fn pick_api_key(
        from_env: Option<String>,
        from_file: Option<String>,
    ) -> Result<String, PipelineError> {
        from_env
            .into_iter()
            .chain(from_file)
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .ok_or(PipelineError::MissingApiKey)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.num_search_results == 0 {
            return Err(PipelineError::config("num_search_results must be at least 1"));
        }
        if self.max_context_results == 0 {
            return Err(PipelineError::config("max_context_results must be at least 1"));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::config("model must not be empty"));
        }
        if self.search.timeout_seconds == 0 {
            return Err(PipelineError::config("search.timeout_seconds must be positive"));
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
            return Err(PipelineError::config(
                "log_level must be one of: trace, debug, info, warn, error",
            ));
        }
        Ok(())
    }
}

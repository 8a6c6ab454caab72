use async_trait::async_trait;
use httpmock::MockServer;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::client::{CompletionRequest, LanguageModel};
use crate::tools::errors::PipelineError;
use crate::tools::web_search::{WebSearchConfig, WebSearchEngine};

/// Replays canned replies in order and records every request.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::with_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, PipelineError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::with_results(Vec::new())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, PipelineError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::llm("scripted", "no reply scripted")))
    }
}

pub fn test_engine(server: &MockServer) -> WebSearchEngine {
    WebSearchEngine::new(WebSearchConfig {
        base_url: server.base_url(),
        retry_attempts: 0,
        ..WebSearchConfig::default()
    })
    .unwrap()
}

/// A DuckDuckGo HTML result page linking to the given (title, url) pairs.
pub fn results_page(hits: &[(&str, String)]) -> String {
    let results: String = hits
        .iter()
        .map(|(title, url)| {
            format!(
                r#"<div class="result results_links"><h2 class="result__title"><a class="result__a" href="{url}">{title}</a></h2><a class="result__snippet">About {title}</a></div>"#
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", results)
}

pub fn page(body: &str) -> String {
    format!("<html><body><nav>menu</nav><p>{}</p></body></html>", body)
}

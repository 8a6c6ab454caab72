use lazy_static::lazy_static;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use super::errors::{PipelineError, RetryConfig, RetryExecutor};

lazy_static! {
    static ref RESULT_SELECTOR: Selector = Selector::parse(".result").unwrap();
    static ref TITLE_SELECTOR: Selector = Selector::parse(".result__a").unwrap();
    static ref FALLBACK_TITLE_SELECTOR: Selector = Selector::parse(".result__title a").unwrap();
    static ref SNIPPET_SELECTOR: Selector = Selector::parse(".result__snippet").unwrap();
}

/// Configuration for web search and page fetching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_content_length: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://html.duckduckgo.com".to_string(),
            timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            retry_attempts: 2,
            retry_delay_ms: 500,
            max_content_length: 15000,
        }
    }
}

/// A single DuckDuckGo hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebSearchEngine {
    client: Client,
    config: Arc<WebSearchConfig>,
}

impl WebSearchEngine {
    pub fn new(config: WebSearchConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &WebSearchConfig {
        &self.config
    }

    /// Search DuckDuckGo's HTML endpoint and return at most `num_results` hits.
    pub async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>, PipelineError> {
        let url = format!(
            "{}/html/?q={}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );

        let html = self.fetch_with_retry(&url).await.map_err(|e| PipelineError::Search {
            query: query.to_string(),
            message: e.to_string(),
        })?;

        let hits = parse_results(&html, num_results);
        log::debug!("DuckDuckGo returned {} usable hits for '{}'", hits.len(), query);
        Ok(hits)
    }

    /// Fetch URL body with retry on recoverable failures
    pub(crate) async fn fetch_with_retry(&self, url: &str) -> Result<String, PipelineError> {
        let retry = RetryExecutor::new(RetryConfig {
            max_retries: self.config.retry_attempts,
            base_delay: Duration::from_millis(self.config.retry_delay_ms),
            ..RetryConfig::default()
        });

        retry.execute(|| self.fetch_once(url)).await
    }

    async fn fetch_once(&self, url: &str) -> Result<String, PipelineError> {
        let limit = Duration::from_secs(self.config.timeout_seconds);

        let response = match timeout(limit, self.client.get(url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(PipelineError::network(url, e)),
            Err(_) => {
                return Err(PipelineError::Timeout {
                    url: url.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        };

        if !response.status().is_success() {
            return Err(PipelineError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|e| PipelineError::network(url, e))
    }
}

/// Parse a DuckDuckGo HTML result page
pub fn parse_results(html: &str, num_results: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let mut hits = Vec::new();
    let mut seen_urls = HashSet::new();

    for result in document.select(&RESULT_SELECTOR) {
        if hits.len() >= num_results {
            break;
        }

        if result.value().classes().any(|c| c == "result--ad") {
            continue;
        }

        let link = result
            .select(&TITLE_SELECTOR)
            .next()
            .or_else(|| result.select(&FALLBACK_TITLE_SELECTOR).next());
        let Some(link) = link else { continue };
        let Some(url) = link.value().attr("href").and_then(clean_duckduckgo_url) else {
            continue;
        };

        let title = clean_text(link);
        if title.is_empty() || !seen_urls.insert(normalize_url_basic(&url)) {
            continue;
        }

        let snippet = result
            .select(&SNIPPET_SELECTOR)
            .next()
            .map(clean_text)
            .unwrap_or_default();

        hits.push(SearchHit { title, url, snippet });
    }

    hits
}

/// Resolve DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=...`) to their target
fn clean_duckduckgo_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    let is_ddg = parsed
        .host_str()
        .map_or(false, |host| host == "duckduckgo.com" || host.ends_with(".duckduckgo.com"));

    let target = if is_ddg {
        if parsed.path() != "/l/" {
            return None;
        }
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())?
    } else {
        absolute
    };

    if target.starts_with("http://") || target.starts_with("https://") {
        Some(target)
    } else {
        None
    }
}

fn clean_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize URL for deduplication
fn normalize_url_basic(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            parsed.path().trim_end_matches('/')
        )
    } else {
        url.to_string()
    }
}

/// Format hits for display
pub fn format_search_results(hits: &[SearchHit], query: &str) -> String {
    if hits.is_empty() {
        return format!("No search results found for '{}'", query);
    }

    let mut output = Vec::new();
    output.push(format!("🔍 Search Results for '{}' ({} results):\n", query, hits.len()));

    for (index, hit) in hits.iter().enumerate() {
        let mut hit_text = vec![
            format!("{}. 🔗 {}", index + 1, hit.title),
            format!("   URL: {}", hit.url),
        ];
        if !hit.snippet.is_empty() {
            hit_text.push(format!("   Snippet: {}", hit.snippet));
        }
        output.push(hit_text.join("\n"));
    }

    output.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const RESULTS_PAGE: &str = r#"
<html><body>
  <div class="result results_links result--ad">
    <h2 class="result__title"><a class="result__a" href="https://duckduckgo.com/y.js?ad_provider=x">Sponsored thing</a></h2>
    <a class="result__snippet">Buy now</a>
  </div>
  <div class="result results_links">
    <h2 class="result__title">
      <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Ftokio.rs%2Ftokio%2Ftutorial&amp;rut=abc">Tokio   <b>Tutorial</b></a>
    </h2>
    <a class="result__snippet">Learn   async Rust with Tokio.</a>
  </div>
  <div class="result results_links">
    <h2 class="result__title"><a class="result__a" href="https://rust-lang.github.io/async-book/">Asynchronous Programming in Rust</a></h2>
    <a class="result__snippet">The async book.</a>
  </div>
  <div class="result results_links">
    <h2 class="result__title"><a class="result__a" href="https://tokio.rs/tokio/tutorial/">Tokio tutorial again</a></h2>
  </div>
  <div class="result results_links">
    <h2 class="result__title"><a class="result__a" href="https://docs.rs/futures">futures - Rust</a></h2>
  </div>
</body></html>"#;

    fn test_config(base_url: String) -> WebSearchConfig {
        WebSearchConfig {
            base_url,
            retry_attempts: 1,
            retry_delay_ms: 1,
            ..WebSearchConfig::default()
        }
    }

    #[test]
    fn parses_hits_and_decodes_redirects() {
        let hits = parse_results(RESULTS_PAGE, 10);

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Tokio Tutorial");
        assert_eq!(hits[0].url, "https://tokio.rs/tokio/tutorial");
        assert_eq!(hits[0].snippet, "Learn async Rust with Tokio.");
        assert_eq!(hits[1].url, "https://rust-lang.github.io/async-book/");
        assert_eq!(hits[2].snippet, "");
    }

    #[test]
    fn respects_result_limit() {
        let hits = parse_results(RESULTS_PAGE, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].title, "Asynchronous Programming in Rust");
    }

    #[test]
    fn rejects_internal_and_non_http_links() {
        assert_eq!(clean_duckduckgo_url("/settings"), None);
        assert_eq!(clean_duckduckgo_url("javascript:void(0)"), None);
        assert_eq!(
            clean_duckduckgo_url("/l/?uddg=http%3A%2F%2Fexample.com%2Fa%3Fb%3D1"),
            Some("http://example.com/a?b=1".to_string())
        );
    }

    #[tokio::test]
    async fn search_queries_the_html_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/html/").query_param("q", "rust async");
                then.status(200).body(RESULTS_PAGE);
            })
            .await;

        let engine = WebSearchEngine::new(test_config(server.base_url())).unwrap();
        let hits = engine.search("rust async", 5).await.unwrap();

        mock.assert_async().await;
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn search_retries_server_errors_then_reports_failure() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/html/");
                then.status(503);
            })
            .await;

        let engine = WebSearchEngine::new(test_config(server.base_url())).unwrap();
        let result = engine.search("anything", 5).await;

        assert!(matches!(result, Err(PipelineError::Search { .. })));
        mock.assert_hits_async(2).await;
    }

    #[test]
    fn formats_hits_for_display() {
        let hits = parse_results(RESULTS_PAGE, 1);
        let text = format_search_results(&hits, "tokio");

        assert!(text.contains("Search Results for 'tokio' (1 results)"));
        assert!(text.contains("URL: https://tokio.rs/tokio/tutorial"));
        assert_eq!(format_search_results(&[], "x"), "No search results found for 'x'");
    }
}

use scraper::{ElementRef, Html};

use super::errors::PipelineError;
use super::web_search::WebSearchEngine;

const SKIPPED_TAGS: [&str; 5] = ["script", "style", "header", "footer", "nav"];
const TRUNCATION_MARKER: &str = "...[content truncated]";

impl WebSearchEngine {
    pub async fn fetch_page_text(&self, url: &str) -> Result<String, PipelineError> {
        let html = self
            .fetch_with_retry(url)
            .await
            .map_err(|e| PipelineError::Scrape {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(extract_page_text(&html, self.config().max_content_length))
    }

    /// Fetch a page and return its readable text. Never fails: the error is
    /// reported inline so the model still sees which source was unavailable.
    pub async fn scrape(&self, url: &str) -> String {
        match self.fetch_page_text(url).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("{}", e);
                let reason = match e {
                    PipelineError::Scrape { message, .. } => message,
                    other => other.to_string(),
                };
                format!("Failed to scrape content from {}: {}", url, reason)
            }
        }
    }
}

/// Strip page chrome and collapse the remaining text into one chunk per line
pub fn extract_page_text(html: &str, max_content_length: usize) -> String {
    let document = Html::parse_document(html);

    let mut pieces = Vec::new();
    collect_text(document.root_element(), &mut pieces);

    let text = pieces
        .iter()
        .flat_map(|piece| piece.lines())
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    limit_content_length(text, max_content_length)
}

fn collect_text(element: ElementRef, pieces: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pieces.push(trimmed.to_string());
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !SKIPPED_TAGS.contains(&child_element.value().name()) {
                collect_text(child_element, pieces);
            }
        }
    }
}

fn limit_content_length(content: String, max_content_length: usize) -> String {
    if content.chars().count() > max_content_length {
        let mut truncated: String = content.chars().take(max_content_length).collect();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    } else {
        content
    }
}

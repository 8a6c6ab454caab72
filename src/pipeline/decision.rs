use serde::Deserialize;

use super::SearchPipeline;
use crate::client::CompletionRequest;
use crate::tools::parser::parse_llm_json;

const SYSTEM_PROMPT: &str = "You analyze queries to determine if they require external information from web search. Always respond in valid JSON format.";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchDecision {
    pub search_needed: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl SearchDecision {
    pub fn forced() -> Self {
        Self {
            search_needed: true,
            reasoning: "Search requested explicitly".to_string(),
            confidence: None,
        }
    }

    fn fallback() -> Self {
        Self {
            search_needed: true,
            reasoning: "Error in decision process, defaulting to search".to_string(),
            confidence: None,
        }
    }
}

fn decision_prompt(query: &str) -> String {
    format!(
        r#"Determine if external information from a web search is necessary to accurately answer this query:

Query: {query}

Consider the following factors:
1. Does the query ask about current events, recent news, or time-sensitive information?
2. Does the query ask for specific data, statistics, or facts that may not be part of your training data?
3. Does the query ask about specific products, services, or websites?
4. Does the query ask about content from specific sources or publications?
5. Is the query about obscure or niche topics that may not be well-covered in your training data?

Output your decision as a JSON object with the following structure:
{{
  "search_needed": true/false,
  "reasoning": "Explanation of why search is or isn't needed",
  "confidence": 0-10 (where 10 is highest confidence)
}}"#
    )
}

impl SearchPipeline {
    /// Ask the model whether answering `query` needs fresh web content.
    /// Any failure defaults to searching.
    pub async fn decide_if_search_needed(&self, query: &str) -> SearchDecision {
        let request = CompletionRequest::new(SYSTEM_PROMPT, decision_prompt(query))
            .max_tokens(1000)
            .temperature(0.0);

        let decision = match self.llm.complete(&request).await {
            Ok(reply) => parse_llm_json::<SearchDecision>("search decision", &reply),
            Err(e) => Err(e),
        };

        match decision {
            Ok(decision) => {
                log::debug!(
                    "search needed: {} (confidence {:?}): {}",
                    decision.search_needed,
                    decision.confidence,
                    decision.reasoning
                );
                decision
            }
            Err(e) => {
                log::warn!("Error deciding if search is needed: {}", e);
                SearchDecision::fallback()
            }
        }
    }
}

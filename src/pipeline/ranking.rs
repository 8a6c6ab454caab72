use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::SearchPipeline;
use crate::client::CompletionRequest;
use crate::tools::parser::parse_llm_json;
use crate::tools::web_search::SearchHit;

const SYSTEM_PROMPT: &str =
    "You are an expert search result evaluator that always responds in valid JSON format.";
const FALLBACK_SCORE: f64 = 5.0;

/// A search hit with the model's relevance judgement attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub relevance_score: f64,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
struct RankingEntry {
    index: i64,
    score: f64,
    #[serde(default)]
    explanation: String,
}

// Models answer either with the documented object or with a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RankingReply {
    Wrapped { rankings: Vec<RankingEntry> },
    Bare(Vec<RankingEntry>),
}

impl RankingReply {
    fn into_entries(self) -> Vec<RankingEntry> {
        match self {
            RankingReply::Wrapped { rankings } => rankings,
            RankingReply::Bare(rankings) => rankings,
        }
    }
}

fn ranking_prompt(hits: &[SearchHit], query: &str) -> String {
    let results_text = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Result {}:\nTitle: {}\nURL: {}\nSnippet: {}",
                i + 1,
                hit.title,
                hit.url,
                hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an expert search result evaluator. Your task is to rank the following search results based on their relevance to the query: "{query}"

Search Results:
{results_text}

For each result, provide:
1. A relevance score from 0-10 (where 10 is most relevant)
2. A brief explanation of why you assigned that score

Format your response as a JSON array with objects containing 'index' (0-based), 'score', and 'explanation' fields.
"#
    )
}

/// Attach model scores to hits. Unknown or repeated indices are ignored.
fn apply_rankings(hits: &[SearchHit], entries: Vec<RankingEntry>) -> Vec<RankedResult> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<RankedResult> = entries
        .into_iter()
        .filter_map(|entry| {
            let index = usize::try_from(entry.index).ok()?;
            let hit = hits.get(index)?;
            if !seen.insert(index) {
                return None;
            }
            Some(RankedResult {
                hit: hit.clone(),
                relevance_score: entry.score,
                explanation: entry.explanation,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

fn unranked(hits: &[SearchHit]) -> Vec<RankedResult> {
    hits.iter()
        .map(|hit| RankedResult {
            hit: hit.clone(),
            relevance_score: FALLBACK_SCORE,
            explanation: "Ranking failed".to_string(),
        })
        .collect()
}

impl SearchPipeline {
    /// Have the model score each hit for relevance, best first.
    /// On failure every hit keeps its search order with a neutral score.
    pub async fn rank_search_results(&self, hits: &[SearchHit], query: &str) -> Vec<RankedResult> {
        if hits.is_empty() {
            return Vec::new();
        }

        let request = CompletionRequest::new(SYSTEM_PROMPT, ranking_prompt(hits, query))
            .max_tokens(8000)
            .temperature(0.0);

        let ranked = match self.llm.complete(&request).await {
            Ok(reply) => parse_llm_json::<RankingReply>("rankings", &reply)
                .map(|reply| apply_rankings(hits, reply.into_entries())),
            Err(e) => Err(e),
        };

        match ranked {
            Ok(ranked) if !ranked.is_empty() => ranked,
            Ok(_) => {
                log::warn!("Error ranking search results: no ranking referenced a known result");
                unranked(hits)
            }
            Err(e) => {
                log::warn!("Error ranking search results: {}", e);
                unranked(hits)
            }
        }
    }
}

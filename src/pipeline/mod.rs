//! Query answering pipeline: decide whether to search, search DuckDuckGo,
//! let the model rank the hits, scrape the best pages into a context, answer,
//! self-evaluate and suggest follow-up questions.
//!
//! Every model-backed step degrades to a fixed fallback instead of failing,
//! so `process_query` always produces an outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::client::LanguageModel;
use crate::tools::web_search::{format_search_results, SearchHit, WebSearchEngine};

pub mod answer;
pub mod context;
pub mod decision;
pub mod evaluation;
pub mod follow_up;
pub mod ranking;

#[cfg(test)]
pub(crate) mod testing;

pub use decision::SearchDecision;
pub use evaluation::{AnswerEvaluation, EvaluationScores};
pub use follow_up::FollowUpQuestion;
pub use ranking::RankedResult;

pub const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant information on the web for your query.";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub num_search_results: usize,
    pub max_context_results: usize,
    /// Skip the "is a search needed" step and always search.
    pub always_search: bool,
    pub evaluate: bool,
    pub follow_ups: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            num_search_results: 5,
            max_context_results: 3,
            always_search: false,
            evaluate: true,
            follow_ups: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Deciding,
    Searching(String),
    Ranking(usize),
    GatheringContext(usize),
    Answering,
    AnsweringFromKnowledge,
    Evaluating,
    FollowUps,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Deciding => write!(f, "Deciding whether a web search is needed..."),
            Stage::Searching(query) => write!(f, "Searching the web for: {}", query),
            Stage::Ranking(count) => write!(f, "Ranking {} search results...", count),
            Stage::GatheringContext(count) => {
                write!(f, "Gathering context from top {} results...", count)
            }
            Stage::Answering => write!(f, "Generating answer based on gathered information..."),
            Stage::AnsweringFromKnowledge => {
                write!(f, "Using model's knowledge to answer the query...")
            }
            Stage::Evaluating => write!(f, "Evaluating and refining the answer..."),
            Stage::FollowUps => write!(f, "Generating potential follow-up questions..."),
        }
    }
}

pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: &Stage);
}

/// Observer that only logs.
pub struct LogObserver;

impl StageObserver for LogObserver {
    fn on_stage(&self, stage: &Stage) {
        log::info!("{}", stage);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub id: Uuid,
    pub original_query: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub search_performed: bool,
    pub search_decision_reasoning: String,
    pub sources: Vec<RankedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub initial_answer: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationScores>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_answer: Option<String>,
    pub follow_up_questions: Vec<FollowUpQuestion>,
}

impl QueryOutcome {
    fn new(query: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_query: query.to_string(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            search_performed: false,
            search_decision_reasoning: String::new(),
            sources: Vec::new(),
            context: None,
            initial_answer: String::new(),
            answer: String::new(),
            evaluation: None,
            issues: Vec::new(),
            refined_answer: None,
            follow_up_questions: Vec::new(),
        }
    }
}

pub struct SearchPipeline {
    llm: Arc<dyn LanguageModel>,
    engine: WebSearchEngine,
    options: PipelineOptions,
    observer: Arc<dyn StageObserver>,
}

impl SearchPipeline {
    pub fn new(llm: Arc<dyn LanguageModel>, engine: WebSearchEngine, options: PipelineOptions) -> Self {
        Self {
            llm,
            engine,
            options,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn StageObserver>) {
        self.observer = observer;
    }

    pub fn model_name(&self) -> &str {
        self.llm.name()
    }

    fn report(&self, stage: Stage) {
        self.observer.on_stage(&stage);
    }

    /// Search DuckDuckGo; failures are logged and treated as "no hits".
    pub async fn search_web(&self, query: &str) -> Vec<SearchHit> {
        match self.engine.search(query, self.options.num_search_results).await {
            Ok(hits) => {
                log::debug!("{}", format_search_results(&hits, query));
                hits
            }
            Err(e) => {
                log::warn!("Error searching the web: {}", e);
                Vec::new()
            }
        }
    }

    /// Run a query through the whole pipeline.
    pub async fn process_query(&self, query: &str) -> QueryOutcome {
        let started = Instant::now();
        let mut outcome = QueryOutcome::new(query);

        let decision = if self.options.always_search {
            SearchDecision::forced()
        } else {
            self.report(Stage::Deciding);
            self.decide_if_search_needed(query).await
        };
        outcome.search_decision_reasoning = decision.reasoning;

        if decision.search_needed {
            outcome.search_performed = true;
            self.report(Stage::Searching(query.to_string()));
            let hits = self.search_web(query).await;

            if hits.is_empty() {
                outcome.answer = NO_RESULTS_ANSWER.to_string();
                outcome.elapsed_ms = started.elapsed().as_millis() as u64;
                return outcome;
            }

            self.report(Stage::Ranking(hits.len()));
            let ranked = self.rank_search_results(&hits, query).await;

            self.report(Stage::GatheringContext(self.options.max_context_results));
            let context = self
                .gather_context(&ranked, self.options.max_context_results)
                .await;

            self.report(Stage::Answering);
            let initial_answer = self.answer_with_context(query, &context).await;
            outcome.initial_answer = initial_answer.clone();
            outcome.answer = initial_answer;

            if self.options.evaluate {
                self.report(Stage::Evaluating);
                let evaluation = self
                    .evaluate_and_refine_answer(query, &outcome.initial_answer, &context)
                    .await;
                outcome.evaluation = Some(evaluation.evaluation);
                outcome.issues = evaluation.issues;
                outcome.answer = evaluation.refined_answer.clone();
                outcome.refined_answer = Some(evaluation.refined_answer);
            }

            outcome.sources = ranked;
            outcome.context = Some(context);
        } else {
            self.report(Stage::AnsweringFromKnowledge);
            outcome.answer = self.answer_from_knowledge(query).await;
            outcome.initial_answer = outcome.answer.clone();
        }

        if self.options.follow_ups {
            self.report(Stage::FollowUps);
            outcome.follow_up_questions = self
                .generate_follow_up_questions(query, &outcome.answer)
                .await;
        }

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }
}

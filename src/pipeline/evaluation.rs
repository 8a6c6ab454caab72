use serde::{Deserialize, Serialize};

use super::SearchPipeline;
use crate::client::CompletionRequest;
use crate::tools::parser::parse_llm_json;

const SYSTEM_PROMPT: &str = "You are an expert at evaluating and improving answers based on search context. Always respond in valid JSON format.";
const CONTEXT_PREVIEW_CHARS: usize = 3000;
const NEUTRAL_SCORE: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub accuracy: f32,
    pub completeness: f32,
    pub clarity: f32,
    pub conciseness: f32,
    pub evidence: f32,
}

impl EvaluationScores {
    fn neutral() -> Self {
        Self {
            accuracy: NEUTRAL_SCORE,
            completeness: NEUTRAL_SCORE,
            clarity: NEUTRAL_SCORE,
            conciseness: NEUTRAL_SCORE,
            evidence: NEUTRAL_SCORE,
        }
    }

    /// (metric, score) pairs in display order
    pub fn entries(&self) -> [(&'static str, f32); 5] {
        [
            ("accuracy", self.accuracy),
            ("completeness", self.completeness),
            ("clarity", self.clarity),
            ("conciseness", self.conciseness),
            ("evidence", self.evidence),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEvaluation {
    pub evaluation: EvaluationScores,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub refined_answer: String,
}

impl AnswerEvaluation {
    fn fallback(answer: &str) -> Self {
        Self {
            evaluation: EvaluationScores::neutral(),
            issues: vec!["Error in evaluation process".to_string()],
            refined_answer: answer.to_string(),
        }
    }
}

fn evaluation_prompt(query: &str, answer: &str, context: &str) -> String {
    let preview: String = context.chars().take(CONTEXT_PREVIEW_CHARS).collect();

    format!(
        r#"Evaluate this answer to the user's query and suggest refinements:

Query: {query}

Answer: {answer}

The answer was generated based on this context information:
{preview}... [context truncated if necessary]

Assess the answer on these dimensions:
1. Accuracy: Does it correctly reflect the information in the context?
2. Completeness: Does it address all aspects of the query?
3. Clarity: Is it easy to understand?
4. Conciseness: Is it appropriately detailed without unnecessary information?
5. Evidence: Does it cite sources appropriately?

Then, provide a refined version of the answer that addresses any issues you identified.

Output your evaluation as a JSON object with the following structure:
{{
  "evaluation": {{
    "accuracy": 0-10,
    "completeness": 0-10,
    "clarity": 0-10,
    "conciseness": 0-10,
    "evidence": 0-10
  }},
  "issues": ["List of specific issues identified"],
  "refined_answer": "Improved version of the answer"
}}"#
    )
}

impl SearchPipeline {
    /// Score the answer against its context and ask for a refined version.
    /// The refined answer falls back to the original when the model returns none.
    pub async fn evaluate_and_refine_answer(
        &self,
        query: &str,
        answer: &str,
        context: &str,
    ) -> AnswerEvaluation {
        let request = CompletionRequest::new(SYSTEM_PROMPT, evaluation_prompt(query, answer, context))
            .max_tokens(4000)
            .temperature(0.2);

        let evaluation = match self.llm.complete(&request).await {
            Ok(reply) => parse_llm_json::<AnswerEvaluation>("evaluation", &reply),
            Err(e) => Err(e),
        };

        match evaluation {
            Ok(mut evaluation) => {
                if evaluation.refined_answer.trim().is_empty() {
                    evaluation.refined_answer = answer.to_string();
                }
                evaluation
            }
            Err(e) => {
                log::warn!("Error evaluating answer: {}", e);
                AnswerEvaluation::fallback(answer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{test_engine, ScriptedModel};
    use crate::pipeline::PipelineOptions;
    use httpmock::MockServer;
    use std::sync::Arc;

    async fn evaluate(model: Arc<ScriptedModel>, context: &str) -> AnswerEvaluation {
        let server = MockServer::start_async().await;
        let pipeline = SearchPipeline::new(model, test_engine(&server), PipelineOptions::default());
        pipeline.evaluate_and_refine_answer("q?", "draft answer", context).await
    }

    #[tokio::test]
    async fn parses_scores_and_refinement() {
        let model = Arc::new(ScriptedModel::new(vec![
            r#"{"evaluation": {"accuracy": 8, "completeness": 6.5, "clarity": 9, "conciseness": 7, "evidence": 3},
                "issues": ["cites nothing"], "refined_answer": "better answer"}"#,
        ]));
        let evaluation = evaluate(model, "ctx").await;

        assert_eq!(evaluation.evaluation.completeness, 6.5);
        assert_eq!(evaluation.issues, vec!["cites nothing".to_string()]);
        assert_eq!(evaluation.refined_answer, "better answer");
    }

    #[tokio::test]
    async fn prompt_carries_only_a_context_preview() {
        let model = Arc::new(ScriptedModel::failing());
        let context = format!("{}{}", "a".repeat(CONTEXT_PREVIEW_CHARS), "TAIL");
        evaluate(model.clone(), &context).await;

        let prompt = &model.requests()[0].prompt;
        assert!(prompt.contains(&format!("{}... [context truncated if necessary]", "a".repeat(3000))));
        assert!(!prompt.contains("TAIL"));
    }

    #[tokio::test]
    async fn failure_keeps_original_answer_with_neutral_scores() {
        let evaluation = evaluate(Arc::new(ScriptedModel::new(vec!["{broken"])), "ctx").await;

        assert_eq!(evaluation.evaluation, EvaluationScores::neutral());
        assert_eq!(evaluation.issues, vec!["Error in evaluation process".to_string()]);
        assert_eq!(evaluation.refined_answer, "draft answer");
    }

    #[tokio::test]
    async fn empty_refinement_keeps_original_answer() {
        let model = Arc::new(ScriptedModel::new(vec![
            r#"{"evaluation": {"accuracy": 9, "completeness": 9, "clarity": 9, "conciseness": 9, "evidence": 9},
                "issues": [], "refined_answer": ""}"#,
        ]));
        let evaluation = evaluate(model, "ctx").await;

        assert_eq!(evaluation.refined_answer, "draft answer");
        assert!(evaluation.issues.is_empty());
    }
}

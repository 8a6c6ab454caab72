use serde::{Deserialize, Serialize};

use super::SearchPipeline;
use crate::client::CompletionRequest;
use crate::tools::parser::parse_llm_json;

const SYSTEM_PROMPT: &str = "You are an expert at identifying valuable follow-up questions that could enhance understanding or provide additional context. Always respond in valid JSON format.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub question: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub priority: f32,
}

#[derive(Deserialize)]
struct FollowUpReply {
    follow_up_questions: Vec<FollowUpQuestion>,
}

fn follow_up_prompt(query: &str, answer: &str) -> String {
    format!(
        r#"Analyze this question and answer pair to generate potential follow-up questions:

Original Question: {query}

Answer: {answer}

Generate 3 relevant follow-up questions that:
1. Address gaps or ambiguities in the current answer
2. Explore related aspects not covered in the original query
3. Request clarification or additional details on specific points

For each follow-up question, explain why it would be valuable to ask.

Output your suggestions as a JSON array with the following structure:
{{
  "follow_up_questions": [
    {{
      "question": "Text of the follow-up question",
      "rationale": "Why this question would be valuable",
      "priority": 1-5 (where 5 is highest priority)
    }}
  ]
}}"#
    )
}

impl SearchPipeline {
    /// Suggest follow-up questions, highest priority first. Empty on failure.
    pub async fn generate_follow_up_questions(&self, query: &str, answer: &str) -> Vec<FollowUpQuestion> {
        let request = CompletionRequest::new(SYSTEM_PROMPT, follow_up_prompt(query, answer))
            .max_tokens(2000)
            .temperature(0.7);

        let reply = match self.llm.complete(&request).await {
            Ok(reply) => parse_llm_json::<FollowUpReply>("follow-up questions", &reply),
            Err(e) => Err(e),
        };

        match reply {
            Ok(reply) => {
                let mut questions: Vec<_> = reply
                    .follow_up_questions
                    .into_iter()
                    .filter(|q| !q.question.trim().is_empty())
                    .collect();
                questions.sort_by(|a, b| {
                    b.priority
                        .partial_cmp(&a.priority)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                questions
            }
            Err(e) => {
                log::warn!("Error generating follow-up questions: {}", e);
                Vec::new()
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

    async fn follow_ups(model: Arc<ScriptedModel>) -> Vec<FollowUpQuestion> {
        let server = MockServer::start_async().await;
        let pipeline = SearchPipeline::new(model, test_engine(&server), PipelineOptions::default());
        pipeline.generate_follow_up_questions("What is Rust?", "A language.").await
    }

    #[tokio::test]
    async fn sorted_by_priority_descending() {
        let model = Arc::new(ScriptedModel::new(vec![
            r#"{"follow_up_questions": [
                {"question": "Who maintains it?", "rationale": "governance", "priority": 2},
                {"question": "Is it memory safe?", "rationale": "core pitch", "priority": 5},
                {"question": "", "rationale": "blank", "priority": 4},
                {"question": "How fast is it?", "rationale": "performance", "priority": 3}
            ]}"#,
        ]));
        let questions = follow_ups(model.clone()).await;

        let priorities: Vec<_> = questions.iter().map(|q| q.priority).collect();
        assert_eq!(priorities, vec![5.0, 3.0, 2.0]);
        assert_eq!(questions[0].question, "Is it memory safe?");

        let request = &model.requests()[0];
        assert!(request.prompt.contains("Original Question: What is Rust?\n\nAnswer: A language."));
        assert_eq!(request.max_tokens, 2000);
    }

    #[tokio::test]
    async fn fractional_priorities_keep_every_question() {
        let model = Arc::new(ScriptedModel::new(vec![
            r#"{"follow_up_questions": [
                {"question": "Which editions exist?", "rationale": "history", "priority": 3},
                {"question": "Does it have a GC?", "rationale": "memory", "priority": 4.5}
            ]}"#,
        ]));
        let questions = follow_ups(model).await;

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question, "Does it have a GC?");
        assert_eq!(questions[0].priority, 4.5);
    }

    #[tokio::test]
    async fn failure_yields_no_questions() {
        assert!(follow_ups(Arc::new(ScriptedModel::new(vec!["nope"]))).await.is_empty());
        assert!(follow_ups(Arc::new(ScriptedModel::failing())).await.is_empty());
    }
}

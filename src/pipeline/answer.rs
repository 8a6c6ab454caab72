use super::SearchPipeline;
use crate::client::CompletionRequest;
use crate::tools::errors::PipelineError;

const CONTEXT_SYSTEM_PROMPT: &str = "You are a helpful assistant that provides accurate, comprehensive answers based on the context provided.";
const KNOWLEDGE_SYSTEM_PROMPT: &str = "You are a helpful assistant that provides accurate, comprehensive answers based on your knowledge.";

fn apology(error: &PipelineError) -> String {
    format!(
        "Sorry, I encountered an error while generating your answer: {}",
        error
    )
}

impl SearchPipeline {
    pub async fn answer_with_context(&self, query: &str, context: &str) -> String {
        let prompt = format!(
            r#"I need you to answer the following question using the provided context information. If the context doesn't contain relevant information, you can use your general knowledge but clearly indicate when you're doing so.

Question: {query}

Context Information:
{context}

Please provide a comprehensive, accurate answer based primarily on the context provided.
"#
        );
        let request = CompletionRequest::new(CONTEXT_SYSTEM_PROMPT, prompt)
            .max_tokens(8000)
            .temperature(0.9);

        self.llm.complete(&request).await.unwrap_or_else(|e| {
            log::warn!("Error generating answer: {}", e);
            apology(&e)
        })
    }

    pub async fn answer_from_knowledge(&self, query: &str) -> String {
        let prompt = format!(
            r#"Please answer this question using your existing knowledge:

Question: {query}

Provide a comprehensive, accurate answer. If you're uncertain about any details, clearly indicate this.
"#
        );
        let request = CompletionRequest::new(KNOWLEDGE_SYSTEM_PROMPT, prompt)
            .max_tokens(4000)
            .temperature(0.7);

        self.llm.complete(&request).await.unwrap_or_else(|e| {
            log::warn!("Error generating answer from model: {}", e);
            apology(&e)
        })
    }
}

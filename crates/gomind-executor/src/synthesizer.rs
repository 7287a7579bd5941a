//! Synthesizer (§4.8): turns an [`ExecutionResult`] into a final prose
//! answer, preferring LLM synthesis, then a fixed template, then simple
//! concatenation.

use gomind_core::ExecutionResult;
use gomind_llm::{ChatCompletionRequest, ChatMessage, LlmClient, LlmError};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStrategy {
    Llm,
    Template,
    Concatenation,
}

pub struct Synthesizer {
    llm: Option<Arc<dyn LlmClient>>,
    strategy: SynthesisStrategy,
}

impl Synthesizer {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, strategy: SynthesisStrategy) -> Self {
        Self { llm, strategy }
    }

    pub async fn synthesize(&self, original_request: &str, result: &ExecutionResult) -> String {
        match self.strategy {
            SynthesisStrategy::Llm => match &self.llm {
                Some(llm) => match self.synthesize_with_llm(llm, original_request, result).await {
                    Ok(text) => text,
                    Err(_) => self.synthesize_by_concatenation(result),
                },
                None => self.synthesize_by_concatenation(result),
            },
            SynthesisStrategy::Template => self.synthesize_with_template(original_request, result),
            SynthesisStrategy::Concatenation => self.synthesize_by_concatenation(result),
        }
    }

    async fn synthesize_with_llm(&self, llm: &Arc<dyn LlmClient>, original_request: &str, result: &ExecutionResult) -> Result<String, LlmError> {
        let successes = result
            .steps
            .iter()
            .filter(|s| s.success)
            .map(|s| format!("{}: {}", s.agent_name, s.response.clone().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Original user request: {original_request}\n\
             Step results:\n{successes}\n\
             Write a single coherent prose answer to the user's request, using only \
             the information above."
        );
        let request = ChatCompletionRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: 0.3,
            max_tokens: None,
            response_format: gomind_llm::ResponseFormat::Text,
        };
        Ok(llm.chat(request).await?.content)
    }

    fn synthesize_with_template(&self, original_request: &str, result: &ExecutionResult) -> String {
        let lines = result
            .steps
            .iter()
            .filter(|s| s.success)
            .map(|s| format!("- {}: {}", s.agent_name, s.response.clone().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Results for \"{original_request}\":\n{lines}")
    }

    fn synthesize_by_concatenation(&self, result: &ExecutionResult) -> String {
        let successful: Vec<String> = result
            .steps
            .iter()
            .filter(|s| s.success)
            .map(|s| format!("{}: {}", s.agent_name, s.response.clone().unwrap_or_default()))
            .collect();
        if successful.is_empty() {
            "No steps completed successfully.".to_string()
        } else {
            successful.join("\n")
        }
    }
}

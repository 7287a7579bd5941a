//! The LLM provider contract. The concrete provider (OpenAI, Anthropic, a
//! local model) is an external collaborator (§1 scope); only the trait
//! matters here.

use crate::types::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),
    #[error("llm response was not valid JSON: {0}")]
    InvalidJson(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError>;
}

//! LLM client contract and Prompt Builder (§4.3, plus the LLM collaborator
//! interface used throughout the planner and binding engine).

pub mod client;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmError};
pub use prompt::{build_micro_resolution_prompt, DefaultPromptBuilder, PromptBuilder, PromptContext, TemplatePromptBuilder, TypeRule};
pub use types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat, Role};

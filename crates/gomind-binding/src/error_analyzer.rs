//! Layer 3 / Error Analyzer (§4.5 layer 3, §4.7): deterministic HTTP-status
//! routing, falling through to an LLM classification call only for
//! ambiguous 4xx statuses.

use gomind_llm::{ChatCompletionRequest, ChatMessage, LlmClient, LlmError};
use serde::Deserialize;
use serde_json::Value as Json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAnalysis {
    pub should_retry: bool,
    /// True when the retry should go through the executor's plain transient
    /// backoff (same payload); false when `suggested_changes` should be
    /// applied before the retry (the LLM-classified correctable case).
    pub transient: bool,
    pub reason: String,
    pub suggested_changes: Option<Json>,
}

impl ErrorAnalysis {
    fn non_correctable(reason: impl Into<String>) -> Self {
        Self { should_retry: false, transient: false, reason: reason.into(), suggested_changes: None }
    }

    fn transient_retry(reason: impl Into<String>) -> Self {
        Self { should_retry: true, transient: true, reason: reason.into(), suggested_changes: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorAnalyzerError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("classification response was not valid JSON: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    should_retry: bool,
    reason: String,
    #[serde(default)]
    suggested_changes: Option<Json>,
}

/// `(http_status, response_body, original_params, user_context)` plus an
/// optional LLM consultation for statuses that aren't deterministically
/// classifiable. The enable/disable toggle is runtime-mutable: when
/// disabled, every call behaves as "no retry" without consulting the LLM.
pub struct ErrorAnalyzer {
    llm: Option<Arc<dyn LlmClient>>,
    enabled: AtomicBool,
}

impl ErrorAnalyzer {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm, enabled: AtomicBool::new(true) }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Status-based routing is applied before any LLM call, and always wins
    /// when it applies (§4.7).
    pub async fn analyze(&self, http_status: u16, response_body: &str, original_params: &Json, user_context: &Json) -> ErrorAnalysis {
        if !self.is_enabled() {
            return ErrorAnalysis::non_correctable("error analyzer disabled");
        }

        match http_status {
            401 | 403 | 405 => ErrorAnalysis::non_correctable(format!("status {http_status} is not correctable")),
            408 | 429 | 500 | 502 | 503 | 504 => {
                ErrorAnalysis::transient_retry(format!("status {http_status} is transient, delegating to backoff retry"))
            }
            400 | 404 | 409 | 422 => self.classify_with_llm(http_status, response_body, original_params, user_context).await,
            _ => ErrorAnalysis::non_correctable(format!("status {http_status} is not correctable")),
        }
    }

    async fn classify_with_llm(&self, http_status: u16, response_body: &str, original_params: &Json, user_context: &Json) -> ErrorAnalysis {
        let Some(llm) = &self.llm else {
            return ErrorAnalysis::non_correctable("no llm configured for classification");
        };

        let prompt = format!(
            "A step call failed with HTTP status {http_status}.\n\
             Response body: {response_body}\n\
             Parameters sent: {original_params}\n\
             User context: {user_context}\n\
             Decide whether this is correctable by adjusting parameters. \
             Respond with raw JSON only: {{\"should_retry\": bool, \"reason\": string, \"suggested_changes\": object|null}}."
        );
        let request = ChatCompletionRequest::deterministic(vec![ChatMessage::user(prompt)]).with_max_tokens(300);

        match llm.chat(request).await {
            Ok(response) => match serde_json::from_str::<ClassificationResponse>(response.content.trim()) {
                Ok(classification) => ErrorAnalysis {
                    should_retry: classification.should_retry,
                    transient: false,
                    reason: classification.reason,
                    suggested_changes: classification.suggested_changes,
                },
                Err(err) => {
                    debug!(error = %err, "classification response malformed, treating as non-correctable");
                    ErrorAnalysis::non_correctable(format!("classification response malformed: {err}"))
                }
            },
            Err(err) => ErrorAnalysis::non_correctable(format!("classification call failed: {err}")),
        }
    }
}

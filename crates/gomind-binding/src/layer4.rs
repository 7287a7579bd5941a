//! Layer 4 — Contextual re-resolution (§4.5 layer 4): a semantic retry used
//! only when Layer 3 says a failure is not correctable but the step still
//! has dependency data that might yield a computed value (e.g. `amount =
//! shares * price`).

use gomind_core::Capability;
use gomind_llm::{ChatCompletionRequest, ChatMessage, LlmClient, LlmError};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct SemanticRetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
}

impl Default for SemanticRetryConfig {
    fn default() -> Self {
        Self { enabled: true, max_attempts: 2 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SemanticRetryError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("semantic retry response was not a JSON object: {0}")]
    InvalidResponse(String),
}

/// Sends the LLM the full trajectory and asks for a corrected parameters
/// object. Returns the full replacement parameter set, not a delta.
pub async fn reresolve(
    llm: &Arc<dyn LlmClient>,
    original_request: &str,
    source_data: &Json,
    capability: &Capability,
    attempted_params: &Json,
    error: &str,
    previous_attempts: &[Json],
) -> Result<HashMap<String, Json>, SemanticRetryError> {
    let schema = capability
        .parameters
        .iter()
        .map(|p| serde_json::json!({"name": p.name, "type": p.type_name, "required": p.required}))
        .collect::<Vec<_>>();

    let prompt = format!(
        "A step call failed and simple error correction could not fix it, but prior step \
         outputs may contain data that yields a corrected value (e.g. a computed quantity).\n\
         Original user request: {original_request}\n\
         Capability parameter schema: {schema:?}\n\
         Data from completed prior steps: {source_data}\n\
         Parameters that were attempted: {attempted_params}\n\
         Error returned: {error}\n\
         Previously tried corrections that also failed: {previous_attempts:?}\n\
         Respond with raw JSON only: a single object containing the full corrected \
         parameters for this call, correctly typed per the schema."
    );

    let request = ChatCompletionRequest::deterministic(vec![ChatMessage::user(prompt)]);
    let response = llm.chat(request).await?;

    let parsed: Json =
        serde_json::from_str(response.content.trim()).map_err(|e| SemanticRetryError::InvalidResponse(e.to_string()))?;
    let Json::Object(map) = parsed else {
        return Err(SemanticRetryError::InvalidResponse("expected a JSON object".to_string()));
    };
    Ok(map.into_iter().collect())
}

//! Layer 2 — LLM micro-resolution (§4.5): a focused prompt for just the
//! parameters Layer 1 could not resolve.

use gomind_core::CapabilityParameter;
use gomind_llm::{build_micro_resolution_prompt, ChatCompletionRequest, ChatMessage, LlmClient, LlmError};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum MicroResolutionError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("micro-resolution response was not a JSON object: {0}")]
    InvalidResponse(String),
}

/// Asks the LLM to fill in `missing` from `source_data`, at temperature 0
/// with a small token budget, and returns only the keys it was asked for.
pub async fn resolve_missing(
    llm: &Arc<dyn LlmClient>,
    missing: &[CapabilityParameter],
    source_data: &Json,
) -> Result<HashMap<String, Json>, MicroResolutionError> {
    let schema: Vec<(String, String)> = missing.iter().map(|p| (p.name.clone(), p.type_name.clone())).collect();
    let prompt = build_micro_resolution_prompt(&schema, source_data);

    let request = ChatCompletionRequest::deterministic(vec![ChatMessage::user(prompt)]).with_max_tokens(256);
    let response = llm.chat(request).await?;

    let parsed: Json = serde_json::from_str(response.content.trim())
        .map_err(|e| MicroResolutionError::InvalidResponse(e.to_string()))?;
    let Json::Object(map) = parsed else {
        return Err(MicroResolutionError::InvalidResponse("expected a JSON object".to_string()));
    };

    let wanted: std::collections::HashSet<&str> = missing.iter().map(|p| p.name.as_str()).collect();
    Ok(map.into_iter().filter(|(k, _)| wanted.contains(k.as_str())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gomind_llm::ChatCompletionResponse;

    struct FixedLlm(String);

    #[async_trait]
    impl LlmClient for FixedLlm {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn chat(&self, _request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
            Ok(ChatCompletionResponse { content: self.0.clone() })
        }
    }

    #[tokio::test]
    async fn resolves_only_requested_keys() {
        let llm: Arc<dyn LlmClient> = Arc::new(FixedLlm(r#"{"units": "metric", "unrelated": 1}"#.to_string()));
        let missing = vec![CapabilityParameter { name: "units".into(), type_name: "string".into(), required: true, description: String::new() }];
        let result = resolve_missing(&llm, &missing, &serde_json::json!({})).await.unwrap();
        assert_eq!(result.get("units"), Some(&Json::String("metric".to_string())));
        assert!(!result.contains_key("unrelated"));
    }

    #[tokio::test]
    async fn rejects_non_object_response() {
        let llm: Arc<dyn LlmClient> = Arc::new(FixedLlm("[1, 2, 3]".to_string()));
        let missing = vec![CapabilityParameter { name: "units".into(), type_name: "string".into(), required: true, description: String::new() }];
        let result = resolve_missing(&llm, &missing, &serde_json::json!({})).await;
        assert!(result.is_err());
    }
}

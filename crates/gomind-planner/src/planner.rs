//! The Planner (§4.4): turns a user request into a validated [`RoutingPlan`].
//!
//! Steps 5-7 of `ProcessRequest` (HITL pre-check, executor handoff,
//! synthesis) live one layer up in the facade crate, which also owns the
//! cache key's capability-digest input — the planner only needs a digest
//! string and a snapshot, not the catalog itself.

use crate::cache::PlanCache;
use crate::cleaner::clean_llm_response;
use gomind_catalog::CatalogSnapshot;
use gomind_core::{PlanValidationError, RequestMetadata, RoutingPlan};
use gomind_llm::{ChatCompletionRequest, ChatMessage, LlmClient, LlmError, PromptBuilder, PromptContext};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("planner response was not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("plan failed validation: {0}")]
    Validation(#[from] PlanValidationError),
}

/// Hashes the request text together with a capability digest (typically a
/// hash of the catalog snapshot's formatted prompt text) so a cache hit
/// cannot be served against stale capabilities (§4.4 step 1).
pub fn cache_key(request: &str, capability_digest: &str) -> String {
    let mut hasher = DefaultHasher::new();
    request.hash(&mut hasher);
    capability_digest.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    prompt_builder: Arc<dyn PromptBuilder>,
    cache: Arc<dyn PlanCache>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, prompt_builder: Arc<dyn PromptBuilder>, cache: Arc<dyn PlanCache>) -> Self {
        Self { llm, prompt_builder, cache }
    }

    /// Produces a validated plan for `request`, consulting the cache first.
    /// `capability_digest` should change whenever the catalog snapshot does,
    /// so a stale plan is never served against capabilities that no longer
    /// exist.
    pub async fn generate_plan(
        &self,
        request: &str,
        _metadata: &RequestMetadata,
        snapshot: &CatalogSnapshot,
        capability_digest: &str,
        prompt_ctx: PromptContext,
    ) -> Result<RoutingPlan, PlannerError> {
        let key = cache_key(request, capability_digest);
        if let Some(plan) = self.cache.get(&key).await {
            debug!(%key, "plan cache hit");
            return Ok(plan);
        }
        debug!(%key, "plan cache miss");

        let prompt = self.prompt_builder.build(&prompt_ctx);
        let response = self
            .llm
            .chat(ChatCompletionRequest::deterministic(vec![ChatMessage::user(prompt)]))
            .await?;

        let cleaned = clean_llm_response(&response.content);
        let plan: RoutingPlan = serde_json::from_str(&cleaned).map_err(PlannerError::InvalidJson)?;

        let known_agents = snapshot.agent_names();
        plan.validate(&known_agents)?;

        info!(plan_id = %plan.plan_id, step_count = plan.steps.len(), "plan generated");
        self.cache.put(key, plan.clone()).await;
        Ok(plan)
    }
}

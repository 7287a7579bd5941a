//! The top-level facade: wires Planner -> HITL Controller -> DAG Executor ->
//! Synthesizer into `process_request` (§4.4 steps 1-7) plus command
//! processing and resume (§4.9).

use crate::hitl_adapter::HitlControllerGate;
use gomind_catalog::{Catalog, CapabilityProvider};
use gomind_core::{
    Command, CheckpointStatus, ExecutionResult, GoMindError, ParamValue, PlanMode, RequestContext, RequestMetadata, RoutingPlan,
};
use gomind_executor::{DagExecutor, Synthesizer};
use gomind_hitl::{CheckpointStore, ControllerError, ControllerOutcome, HitlController};
use gomind_llm::PromptContext;
use gomind_planner::Planner;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;

/// Outcome of driving a request (or a resumed checkpoint) to either
/// completion or the next HITL pause.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Completed { result: ExecutionResult, answer: String },
    Interrupted { checkpoint_id: String },
    /// The governing checkpoint was rejected or aborted: the run stops here
    /// with no executor invocation (§8 scenario E).
    Aborted { checkpoint_id: String, reason: String },
}

pub struct Orchestrator {
    catalog: Arc<Catalog>,
    capability_provider: Arc<dyn CapabilityProvider>,
    planner: Arc<Planner>,
    executor: Arc<DagExecutor>,
    synthesizer: Arc<Synthesizer>,
    hitl: Arc<HitlController>,
    checkpoint_store: Arc<dyn CheckpointStore>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<Catalog>,
        capability_provider: Arc<dyn CapabilityProvider>,
        planner: Arc<Planner>,
        executor: Arc<DagExecutor>,
        synthesizer: Arc<Synthesizer>,
        hitl: Arc<HitlController>,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self { catalog, capability_provider, planner, executor, synthesizer, hitl, checkpoint_store }
    }

    /// `ProcessRequest` (§4.4): generate or reuse a cached plan, run the
    /// plan-level HITL check, hand the plan to the executor, then
    /// synthesize the final answer.
    pub async fn process_request(
        &self,
        request: &str,
        metadata: RequestMetadata,
        mode: PlanMode,
        ctx: &RequestContext,
        user_context: HashMap<String, Json>,
    ) -> Result<ProcessOutcome, GoMindError> {
        let snapshot = self.catalog.snapshot().await;
        let capability_text = self
            .capability_provider
            .get_capabilities(request, &metadata)
            .await
            .map_err(|err| GoMindError::Other(err.to_string()))?;
        let digest = capability_digest(&capability_text);

        let prompt_ctx = PromptContext { capability_text, user_request: request.to_string(), ..Default::default() };
        let mut plan = self
            .planner
            .generate_plan(request, &metadata, &snapshot, &digest, prompt_ctx)
            .await
            .map_err(|err| GoMindError::PlanValidation(err.to_string()))?;
        plan.mode = mode;

        let user_context_json = Json::Object(user_context.clone().into_iter().collect());

        if let ControllerOutcome::Interrupted(checkpoint) = self.hitl.check_plan(ctx, &plan, user_context.clone()).await {
            return Ok(ProcessOutcome::Interrupted { checkpoint_id: checkpoint.checkpoint_id });
        }

        let gate = Arc::new(HitlControllerGate::new(self.hitl.clone(), user_context));
        let result = self.executor.execute(&plan, &snapshot, ctx, gate, &user_context_json).await;
        self.finish(request, result).await
    }

    async fn finish(&self, request: &str, result: ExecutionResult) -> Result<ProcessOutcome, GoMindError> {
        if let Some(Json::String(checkpoint_id)) = result.metadata.get("interrupted_checkpoint_id") {
            return Ok(ProcessOutcome::Interrupted { checkpoint_id: checkpoint_id.clone() });
        }
        let answer = self.synthesizer.synthesize(request, &result).await;
        Ok(ProcessOutcome::Completed { result, answer })
    }

    /// `ProcessCommand` (§4.9): applies an operator command to a pending
    /// checkpoint. The caller is responsible for calling [`Orchestrator::resume`]
    /// afterwards if the command leaves the checkpoint resumable.
    pub async fn process_command(&self, command: Command) -> Result<(), ControllerError> {
        self.hitl.process_command(command).await.map(|_| ())
    }

    /// `ResumeExecution` (§4.9): reconstructs execution state from a
    /// checkpoint that a command has already moved to `approved`/`edited`,
    /// re-drives the executor (carrying completed steps over, skipping the
    /// paused step if the command was `skip`), and marks the checkpoint
    /// `completed` once the resumed run reaches a terminal state. A
    /// `rejected`/`aborted` checkpoint short-circuits with no executor call.
    pub async fn resume(&self, checkpoint_id: &str, command: Option<Command>) -> Result<ProcessOutcome, GoMindError> {
        let checkpoint = self
            .checkpoint_store
            .get(checkpoint_id)
            .await
            .ok_or_else(|| GoMindError::CheckpointNotFound(checkpoint_id.to_string()))?;

        if matches!(checkpoint.status, CheckpointStatus::Rejected | CheckpointStatus::Aborted) {
            return Ok(ProcessOutcome::Aborted {
                checkpoint_id: checkpoint_id.to_string(),
                reason: checkpoint.decision.reason.clone(),
            });
        }

        let resume_plan = self.hitl.prepare_resume(&checkpoint, command.as_ref()).map_err(controller_err(checkpoint_id))?;

        let mut plan: RoutingPlan = resume_plan.plan;
        if let Some(edited) = &resume_plan.edited_params {
            if let Some(current_step_id) = checkpoint.current_step.as_ref().map(|s| s.step_id.clone()) {
                if let Some(step) = plan.steps.iter_mut().find(|s| s.step_id == current_step_id) {
                    for (key, value) in edited {
                        step.metadata.parameters.insert(key.clone(), ParamValue::Literal(value.clone()));
                    }
                }
            }
        }

        let snapshot = self.catalog.snapshot().await;
        let completed_results = checkpoint.step_results.clone();
        let gate = Arc::new(HitlControllerGate::new(self.hitl.clone(), checkpoint.user_context.clone()));
        let user_context_json = Json::Object(checkpoint.user_context.clone().into_iter().collect());

        let result = self
            .executor
            .execute_from(&plan, &snapshot, &resume_plan.context, gate, &user_context_json, completed_results, resume_plan.skip_step)
            .await;

        let outcome = self.finish(&checkpoint.original_request, result).await?;
        if matches!(outcome, ProcessOutcome::Completed { .. }) {
            self.hitl.complete_resume(&resume_plan.checkpoint_id).await.map_err(controller_err(checkpoint_id))?;
        }
        info!(checkpoint_id, "resume finished");
        Ok(outcome)
    }

    /// Force-aborts a pending checkpoint, independent of any operator
    /// command (§9 design notes, Open Question 3: cancelling a task aborts
    /// the checkpoint it raised rather than leaving it pending forever).
    pub async fn abort_checkpoint(&self, checkpoint_id: &str) -> Result<(), GoMindError> {
        self.checkpoint_store.claim(checkpoint_id, CheckpointStatus::Aborted).await.map(|_| ()).map_err(|err| match err {
            gomind_hitl::CheckpointStoreError::NotFound(id) => GoMindError::CheckpointNotFound(id),
            gomind_hitl::CheckpointStoreError::AlreadyTerminal(id, _) => GoMindError::InvalidCommand(id),
        })
    }
}

fn controller_err(checkpoint_id: &str) -> impl Fn(ControllerError) -> GoMindError + '_ {
    move |err| match err {
        ControllerError::CheckpointNotFound(id) => GoMindError::CheckpointNotFound(id),
        ControllerError::CheckpointExpired(id) => GoMindError::CheckpointExpired(id),
        ControllerError::InvalidCommand(_) => GoMindError::InvalidCommand(checkpoint_id.to_string()),
    }
}

/// Hashes the capability text so the planner's cache key changes whenever
/// the catalog's advertised capabilities change (§4.4 step 1).
fn capability_digest(capability_text: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    capability_text.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

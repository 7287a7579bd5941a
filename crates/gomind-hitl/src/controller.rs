//! HITL Controller (§4.9): ties the [`Policy`](crate::policy::Policy),
//! [`CheckpointStore`], [`CommandBus`] and [`InterruptNotifier`] together
//! into the check-point / command / resume flow.

use crate::checkpoint_store::{CheckpointStore, CheckpointStoreError};
use crate::command_bus::CommandBus;
use crate::notifier::InterruptNotifier;
use crate::policy::Policy;
use chrono::Utc;
use gomind_core::{
    Command, CommandType, ExecutionCheckpoint, CheckpointStatus, InterruptDecision, InterruptPoint,
    RequestContext, ResumePointKey, RoutingPlan, RoutingStep, StepResult,
};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),
    #[error("checkpoint {0} has expired")]
    CheckpointExpired(String),
    #[error("command is not valid for the checkpoint's current state: {0}")]
    InvalidCommand(String),
}

/// Result of a single check-point evaluation.
pub enum ControllerOutcome {
    Continue,
    Interrupted(Box<ExecutionCheckpoint>),
}

/// Everything the caller needs to know to resume execution after a command
/// puts a checkpoint into an approved/edited state.
pub struct ResumePlan {
    pub context: RequestContext,
    pub plan: RoutingPlan,
    pub completed_steps: Vec<String>,
    pub skip_step: Option<String>,
    pub edited_params: Option<HashMap<String, Json>>,
    pub response: Option<Json>,
    pub checkpoint_id: String,
}

/// Parameters describing where in the execution lifecycle a check point was
/// raised, bundled so the four `check_*` methods share one checkpoint-building
/// path.
struct CheckpointDraft<'a> {
    ctx: &'a RequestContext,
    plan: &'a RoutingPlan,
    step: Option<&'a RoutingStep>,
    step_result: Option<&'a StepResult>,
    completed_steps: Vec<String>,
    resolved_parameters: HashMap<String, Json>,
    user_context: HashMap<String, Json>,
}

pub struct HitlController {
    policy: Arc<dyn Policy>,
    store: Arc<dyn CheckpointStore>,
    bus: Arc<CommandBus>,
    notifier: Arc<dyn InterruptNotifier>,
}

impl HitlController {
    pub fn new(policy: Arc<dyn Policy>, store: Arc<dyn CheckpointStore>, bus: Arc<CommandBus>, notifier: Arc<dyn InterruptNotifier>) -> Self {
        Self { policy, store, bus, notifier }
    }

    async fn raise(&self, point: InterruptPoint, decision: InterruptDecision, draft: CheckpointDraft<'_>) -> ControllerOutcome {
        if !decision.should_interrupt {
            return ControllerOutcome::Continue;
        }
        let now = Utc::now();
        let checkpoint = ExecutionCheckpoint {
            checkpoint_id: Uuid::new_v4().to_string(),
            request_id: draft.ctx.request_id.clone(),
            original_request_id: draft.ctx.original_request_id.clone(),
            interrupt_point: point,
            decision: decision.clone(),
            plan: draft.plan.clone(),
            completed_steps: draft.completed_steps,
            current_step: draft.step.cloned(),
            current_step_result: draft.step_result.cloned(),
            step_results: HashMap::new(),
            resolved_parameters: draft.resolved_parameters,
            original_request: draft.plan.original_request.clone(),
            user_context: draft.user_context,
            request_mode: draft.plan.mode,
            original_trace_id: draft.ctx.trace_id.clone(),
            created_at: now,
            expires_at: now + chrono::Duration::from_std(decision.timeout).unwrap_or(chrono::Duration::hours(24)),
            status: CheckpointStatus::Pending,
        };
        self.store.put(checkpoint.clone()).await;
        self.notifier.notify(&checkpoint).await;
        ControllerOutcome::Interrupted(Box::new(checkpoint))
    }

    pub async fn check_plan(&self, ctx: &RequestContext, plan: &RoutingPlan, user_context: HashMap<String, Json>) -> ControllerOutcome {
        let key = ResumePointKey { point: InterruptPoint::PlanGenerated, step_id: None };
        if ctx.should_skip_hitl(&key) {
            return ControllerOutcome::Continue;
        }
        let decision = self.policy.should_approve_plan(plan).await;
        self.raise(
            InterruptPoint::PlanGenerated,
            decision,
            CheckpointDraft { ctx, plan, step: None, step_result: None, completed_steps: vec![], resolved_parameters: HashMap::new(), user_context },
        )
        .await
    }

    pub async fn check_before_step(
        &self,
        ctx: &RequestContext,
        plan: &RoutingPlan,
        step: &RoutingStep,
        completed_steps: Vec<String>,
        resolved_parameters: HashMap<String, Json>,
        user_context: HashMap<String, Json>,
    ) -> ControllerOutcome {
        let key = ResumePointKey { point: InterruptPoint::BeforeStep, step_id: Some(step.step_id.clone()) };
        if ctx.should_skip_hitl(&key) {
            return ControllerOutcome::Continue;
        }
        let decision = self.policy.should_approve_before_step(plan, step).await;
        self.raise(
            InterruptPoint::BeforeStep,
            decision,
            CheckpointDraft { ctx, plan, step: Some(step), step_result: None, completed_steps, resolved_parameters, user_context },
        )
        .await
    }

    pub async fn check_after_step(
        &self,
        ctx: &RequestContext,
        plan: &RoutingPlan,
        step: &RoutingStep,
        step_result: &StepResult,
        completed_steps: Vec<String>,
        user_context: HashMap<String, Json>,
    ) -> ControllerOutcome {
        let key = ResumePointKey { point: InterruptPoint::AfterStep, step_id: Some(step.step_id.clone()) };
        if ctx.should_skip_hitl(&key) {
            return ControllerOutcome::Continue;
        }
        let decision = self.policy.should_approve_after_step(plan, step).await;
        self.raise(
            InterruptPoint::AfterStep,
            decision,
            CheckpointDraft { ctx, plan, step: Some(step), step_result: Some(step_result), completed_steps, resolved_parameters: HashMap::new(), user_context },
        )
        .await
    }

    pub async fn check_error(
        &self,
        ctx: &RequestContext,
        plan: &RoutingPlan,
        step: &RoutingStep,
        step_result: &StepResult,
        err: &str,
        attempts: u32,
        completed_steps: Vec<String>,
        user_context: HashMap<String, Json>,
    ) -> ControllerOutcome {
        let key = ResumePointKey { point: InterruptPoint::OnError, step_id: Some(step.step_id.clone()) };
        if ctx.should_skip_hitl(&key) {
            return ControllerOutcome::Continue;
        }
        let decision = self.policy.should_escalate_error(step, err, attempts).await;
        self.raise(
            InterruptPoint::OnError,
            decision,
            CheckpointDraft { ctx, plan, step: Some(step), step_result: Some(step_result), completed_steps, resolved_parameters: HashMap::new(), user_context },
        )
        .await
    }

    /// Applies an operator command to a pending checkpoint (§4.9 "Command
    /// processing"). The claim inside the store guarantees exactly one
    /// concurrent call succeeds (§8 invariant 8).
    pub async fn process_command(&self, command: Command) -> Result<ExecutionCheckpoint, ControllerError> {
        let target_status = match command.command_type {
            CommandType::Approve | CommandType::Skip | CommandType::Retry | CommandType::Respond => CheckpointStatus::Approved,
            CommandType::Edit => CheckpointStatus::Edited,
            CommandType::Reject => CheckpointStatus::Rejected,
            CommandType::Abort => CheckpointStatus::Aborted,
        };
        let checkpoint = self.store.claim(&command.checkpoint_id, target_status).await.map_err(|err| match err {
            CheckpointStoreError::NotFound(id) => ControllerError::CheckpointNotFound(id),
            CheckpointStoreError::AlreadyTerminal(id, _) => ControllerError::InvalidCommand(id),
        })?;
        self.bus.publish(&command.checkpoint_id, command.clone());
        self.bus.close(&command.checkpoint_id);
        Ok(checkpoint)
    }

    /// Reconstructs the execution state needed to resume a checkpoint that
    /// has been approved or edited (§4.9 "Resume"). Does not itself re-drive
    /// the executor — that orchestration lives in the facade, which owns
    /// both the executor and this controller.
    pub fn prepare_resume(&self, checkpoint: &ExecutionCheckpoint, command: Option<&Command>) -> Result<ResumePlan, ControllerError> {
        if !matches!(checkpoint.status, CheckpointStatus::Approved | CheckpointStatus::Edited) {
            return Err(ControllerError::InvalidCommand(checkpoint.checkpoint_id.clone()));
        }

        let mut resume_skip = std::collections::HashSet::new();
        resume_skip.insert(ResumePointKey { point: checkpoint.interrupt_point, step_id: checkpoint.current_step.as_ref().map(|s| s.step_id.clone()) });

        let context = RequestContext::resumed(Uuid::new_v4().to_string(), checkpoint.original_request_id.clone(), checkpoint.original_trace_id.clone(), resume_skip);

        let plan = match command.and_then(|c| c.edited_plan.clone()) {
            Some(edited) => edited,
            None => checkpoint.plan.clone(),
        };

        let skip_step = match command.map(|c| c.command_type) {
            Some(CommandType::Skip) => checkpoint.current_step.as_ref().map(|s| s.step_id.clone()),
            _ => None,
        };

        Ok(ResumePlan {
            context,
            plan,
            completed_steps: checkpoint.completed_steps.clone(),
            skip_step,
            edited_params: command.and_then(|c| c.edited_params.clone()),
            response: command.and_then(|c| c.response.clone()),
            checkpoint_id: checkpoint.checkpoint_id.clone(),
        })
    }

    /// Marks a checkpoint `completed` once the facade has finished driving
    /// the resumed execution to a terminal state.
    pub async fn complete_resume(&self, checkpoint_id: &str) -> Result<(), ControllerError> {
        self.store
            .claim(checkpoint_id, CheckpointStatus::Completed)
            .await
            .map(|_| ())
            .map_err(|err| match err {
                CheckpointStoreError::NotFound(id) => ControllerError::CheckpointNotFound(id),
                CheckpointStoreError::AlreadyTerminal(id, _) => ControllerError::InvalidCommand(id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint_store::InMemoryCheckpointStore;
    use crate::notifier::NoopNotifier;
    use crate::policy::{RuleBasedPolicy, RuleBasedPolicyConfig};
    use gomind_core::{PlanMode, StepMetadata};

    fn plan_with_capability(cap: &str) -> RoutingPlan {
        RoutingPlan {
            plan_id: "p1".to_string(),
            original_request: "req".to_string(),
            mode: PlanMode::NonStreaming,
            steps: vec![RoutingStep {
                step_id: "s1".to_string(),
                agent_name: "agent-a".to_string(),
                namespace: String::new(),
                instruction: String::new(),
                depends_on: vec![],
                metadata: StepMetadata { capability: cap.to_string(), parameters: Default::default() },
            }],
            created_at: Utc::now(),
        }
    }

    fn controller(config: RuleBasedPolicyConfig) -> HitlController {
        HitlController::new(
            Arc::new(RuleBasedPolicy::new(config)),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(CommandBus::new()),
            Arc::new(NoopNotifier),
        )
    }

    #[tokio::test]
    async fn sensitive_plan_raises_a_pending_checkpoint() {
        let mut config = RuleBasedPolicyConfig::default();
        config.sensitive_capabilities.insert("wire_transfer".to_string());
        let controller = controller(config);
        let ctx = RequestContext::new("req-1");
        let plan = plan_with_capability("wire_transfer");

        match controller.check_plan(&ctx, &plan, HashMap::new()).await {
            ControllerOutcome::Interrupted(checkpoint) => {
                assert_eq!(checkpoint.status, CheckpointStatus::Pending);
                assert_eq!(checkpoint.request_id, "req-1");
                assert_eq!(checkpoint.original_request_id, "req-1");
            }
            ControllerOutcome::Continue => panic!("expected an interrupt"),
        }
    }

    #[tokio::test]
    async fn ordinary_plan_does_not_interrupt() {
        let controller = controller(RuleBasedPolicyConfig::default());
        let ctx = RequestContext::new("req-1");
        let plan = plan_with_capability("geocode");
        assert!(matches!(controller.check_plan(&ctx, &plan, HashMap::new()).await, ControllerOutcome::Continue));
    }

    #[tokio::test]
    async fn resume_mode_skips_a_matching_check_point() {
        let mut config = RuleBasedPolicyConfig::default();
        config.sensitive_capabilities.insert("wire_transfer".to_string());
        let controller = controller(config);
        let plan = plan_with_capability("wire_transfer");

        let mut resume_skip = std::collections::HashSet::new();
        resume_skip.insert(ResumePointKey { point: InterruptPoint::PlanGenerated, step_id: None });
        let ctx = RequestContext::resumed("req-2", "req-1", None, resume_skip);

        assert!(matches!(controller.check_plan(&ctx, &plan, HashMap::new()).await, ControllerOutcome::Continue));
    }

    #[tokio::test]
    async fn process_command_is_exclusive_and_publishes_to_the_bus() {
        let controller = controller(RuleBasedPolicyConfig { sensitive_capabilities: ["wire_transfer".to_string()].into_iter().collect(), ..Default::default() });
        let ctx = RequestContext::new("req-1");
        let plan = plan_with_capability("wire_transfer");
        let checkpoint = match controller.check_plan(&ctx, &plan, HashMap::new()).await {
            ControllerOutcome::Interrupted(c) => *c,
            _ => unreachable!(),
        };

        let mut rx = controller.bus.subscribe(&checkpoint.checkpoint_id);
        let command = Command {
            command_id: "cmd-1".to_string(),
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            command_type: CommandType::Approve,
            edited_plan: None,
            edited_step: None,
            edited_params: None,
            feedback: None,
            response: None,
            user_id: "operator".to_string(),
            timestamp: Utc::now(),
        };

        let first = controller.process_command(command.clone()).await;
        assert!(first.is_ok());
        assert!(rx.recv().await.is_ok());

        let second = controller.process_command(command).await;
        assert!(matches!(second, Err(ControllerError::InvalidCommand(_))));
    }

    #[tokio::test]
    async fn prepare_resume_carries_completed_steps_and_edited_params() {
        let controller = controller(RuleBasedPolicyConfig::default());
        let mut checkpoint = ExecutionCheckpoint {
            checkpoint_id: "c1".to_string(),
            request_id: "req-1".to_string(),
            original_request_id: "req-1".to_string(),
            interrupt_point: InterruptPoint::BeforeStep,
            decision: InterruptDecision::no_interrupt(),
            plan: plan_with_capability("transfer_funds"),
            completed_steps: vec!["s0".to_string()],
            current_step: Some(plan_with_capability("transfer_funds").steps[0].clone()),
            current_step_result: None,
            step_results: HashMap::new(),
            resolved_parameters: HashMap::new(),
            original_request: "req".to_string(),
            user_context: HashMap::new(),
            request_mode: PlanMode::NonStreaming,
            original_trace_id: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            status: CheckpointStatus::Edited,
        };
        checkpoint.status = CheckpointStatus::Edited;

        let command = Command {
            command_id: "cmd-1".to_string(),
            checkpoint_id: "c1".to_string(),
            command_type: CommandType::Edit,
            edited_plan: None,
            edited_step: None,
            edited_params: Some(HashMap::from([("amount".to_string(), Json::from(15000))])),
            feedback: None,
            response: None,
            user_id: "operator".to_string(),
            timestamp: Utc::now(),
        };

        let resume = controller.prepare_resume(&checkpoint, Some(&command)).unwrap();
        assert_eq!(resume.completed_steps, vec!["s0".to_string()]);
        assert_eq!(resume.edited_params.unwrap().get("amount"), Some(&Json::from(15000)));
        assert_eq!(resume.context.original_request_id, "req-1");
    }
}

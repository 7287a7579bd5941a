//! HITL Policy (§4.9): four predicates deciding whether a check point
//! interrupts the run, plus a reference rule-based implementation consulting
//! sensitive-capability/agent lists and a retry escalation threshold.

use async_trait::async_trait;
use gomind_core::{DefaultAction, ExpiryBehavior, InterruptDecision, PlanMode, RoutingPlan, RoutingStep};
use std::collections::HashSet;
use std::time::Duration;

#[async_trait]
pub trait Policy: Send + Sync {
    async fn should_approve_plan(&self, plan: &RoutingPlan) -> InterruptDecision;
    async fn should_approve_before_step(&self, plan: &RoutingPlan, step: &RoutingStep) -> InterruptDecision;
    async fn should_approve_after_step(&self, plan: &RoutingPlan, step: &RoutingStep) -> InterruptDecision;
    async fn should_escalate_error(&self, step: &RoutingStep, err: &str, attempts: u32) -> InterruptDecision;
}

#[derive(Debug, Clone)]
pub struct RuleBasedPolicyConfig {
    pub sensitive_capabilities: HashSet<String>,
    pub sensitive_agents: HashSet<String>,
    pub step_sensitive_capabilities: HashSet<String>,
    pub step_sensitive_agents: HashSet<String>,
    pub retry_escalation_threshold: u32,
    pub timeout: Duration,
    pub default_action: DefaultAction,
    pub streaming_expiry_behavior: ExpiryBehavior,
    pub non_streaming_expiry_behavior: ExpiryBehavior,
}

impl Default for RuleBasedPolicyConfig {
    fn default() -> Self {
        Self {
            sensitive_capabilities: HashSet::new(),
            sensitive_agents: HashSet::new(),
            step_sensitive_capabilities: HashSet::new(),
            step_sensitive_agents: HashSet::new(),
            retry_escalation_threshold: 3,
            timeout: Duration::from_secs(24 * 3600),
            default_action: DefaultAction::Reject,
            streaming_expiry_behavior: ExpiryBehavior::ImplicitDeny,
            non_streaming_expiry_behavior: ExpiryBehavior::ApplyDefault,
        }
    }
}

pub struct RuleBasedPolicy {
    config: RuleBasedPolicyConfig,
}

impl RuleBasedPolicy {
    pub fn new(config: RuleBasedPolicyConfig) -> Self {
        Self { config }
    }

    fn decision(&self, should_interrupt: bool, reason: impl Into<String>, message: impl Into<String>, priority: u8) -> InterruptDecision {
        InterruptDecision {
            should_interrupt,
            reason: reason.into(),
            message: message.into(),
            priority,
            timeout: self.config.timeout,
            default_action: self.config.default_action,
            streaming_expiry_behavior: self.config.streaming_expiry_behavior,
            non_streaming_expiry_behavior: self.config.non_streaming_expiry_behavior,
            default_request_mode: PlanMode::NonStreaming,
        }
    }
}

#[async_trait]
impl Policy for RuleBasedPolicy {
    async fn should_approve_plan(&self, plan: &RoutingPlan) -> InterruptDecision {
        for step in &plan.steps {
            if self.config.sensitive_capabilities.contains(&step.metadata.capability) {
                return self.decision(true, "sensitive_capability", format!("plan includes sensitive capability {}", step.metadata.capability), 5);
            }
            if self.config.sensitive_agents.contains(&step.agent_name) {
                return self.decision(true, "sensitive_agent", format!("plan includes sensitive agent {}", step.agent_name), 5);
            }
        }
        InterruptDecision::no_interrupt()
    }

    async fn should_approve_before_step(&self, _plan: &RoutingPlan, step: &RoutingStep) -> InterruptDecision {
        if self.config.step_sensitive_capabilities.contains(&step.metadata.capability) {
            return self.decision(true, "sensitive_capability", format!("step invokes sensitive capability {}", step.metadata.capability), 5);
        }
        if self.config.step_sensitive_agents.contains(&step.agent_name) {
            return self.decision(true, "sensitive_agent", format!("step invokes sensitive agent {}", step.agent_name), 5);
        }
        InterruptDecision::no_interrupt()
    }

    async fn should_approve_after_step(&self, _plan: &RoutingPlan, _step: &RoutingStep) -> InterruptDecision {
        InterruptDecision::no_interrupt()
    }

    async fn should_escalate_error(&self, step: &RoutingStep, err: &str, attempts: u32) -> InterruptDecision {
        if attempts >= self.config.retry_escalation_threshold {
            return self.decision(
                true,
                "retry_threshold_exceeded",
                format!("step {} failed {attempts} times: {err}", step.step_id),
                8,
            );
        }
        InterruptDecision::no_interrupt()
    }
}

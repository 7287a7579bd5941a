//! Narrow collaborator interface onto the HITL Controller (§4.9), the same
//! pattern as `Discovery` and `LlmClient`: the executor only needs to ask
//! "should this check point interrupt the run", not how checkpoints are
//! stored or expired.

use async_trait::async_trait;
use gomind_core::{InterruptPoint, RequestContext, RoutingPlan, RoutingStep, StepResult};

pub enum HitlOutcome {
    Continue,
    Interrupted { checkpoint_id: String },
}

#[async_trait]
pub trait HitlGate: Send + Sync {
    /// `error_attempts` carries `(last error message, attempts made so far)`
    /// and is only ever `Some` for an `OnError` check; the other check
    /// points have no use for it.
    async fn check(
        &self,
        point: InterruptPoint,
        ctx: &RequestContext,
        plan: &RoutingPlan,
        step: Option<&RoutingStep>,
        step_result: Option<&StepResult>,
        error_attempts: Option<(&str, u32)>,
    ) -> HitlOutcome;
}

/// A gate that never interrupts, for callers that run the executor without
/// HITL wired in (e.g. unit tests, or a deployment with HITL disabled).
pub struct NoopHitlGate;

#[async_trait]
impl HitlGate for NoopHitlGate {
    async fn check(
        &self,
        _point: InterruptPoint,
        _ctx: &RequestContext,
        _plan: &RoutingPlan,
        _step: Option<&RoutingStep>,
        _step_result: Option<&StepResult>,
        _error_attempts: Option<(&str, u32)>,
    ) -> HitlOutcome {
        HitlOutcome::Continue
    }
}

//! Adapts the real [`HitlController`] to the narrow [`HitlGate`] interface
//! the DAG Executor depends on, keeping `gomind-executor` and `gomind-hitl`
//! mutually unaware of each other (§9 design notes).

use async_trait::async_trait;
use gomind_core::{InterruptPoint, RequestContext, RoutingPlan, RoutingStep, StepResult};
use gomind_executor::{HitlGate, HitlOutcome};
use gomind_hitl::{ControllerOutcome, HitlController};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct HitlControllerGate {
    controller: Arc<HitlController>,
    user_context: HashMap<String, Json>,
    completed_steps: Mutex<Vec<String>>,
}

impl HitlControllerGate {
    pub fn new(controller: Arc<HitlController>, user_context: HashMap<String, Json>) -> Self {
        Self { controller, user_context, completed_steps: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl HitlGate for HitlControllerGate {
    async fn check(
        &self,
        point: InterruptPoint,
        ctx: &RequestContext,
        plan: &RoutingPlan,
        step: Option<&RoutingStep>,
        step_result: Option<&StepResult>,
        error_attempts: Option<(&str, u32)>,
    ) -> HitlOutcome {
        let completed_so_far = self.completed_steps.lock().await.clone();

        let outcome = match point {
            InterruptPoint::BeforeStep => {
                let step = step.expect("before_step check always carries a step");
                self.controller.check_before_step(ctx, plan, step, completed_so_far, HashMap::new(), self.user_context.clone()).await
            }
            InterruptPoint::AfterStep => {
                let step = step.expect("after_step check always carries a step");
                let result = step_result.expect("after_step check always carries a result");
                if result.success {
                    self.completed_steps.lock().await.push(step.step_id.clone());
                }
                self.controller.check_after_step(ctx, plan, step, result, completed_so_far, self.user_context.clone()).await
            }
            InterruptPoint::OnError => {
                let step = step.expect("on_error check always carries a step");
                let result = step_result.expect("on_error check always carries a result");
                let (err, attempts) = error_attempts.expect("on_error check always carries err/attempts");
                self.controller.check_error(ctx, plan, step, result, err, attempts, completed_so_far, self.user_context.clone()).await
            }
            InterruptPoint::PlanGenerated => ControllerOutcome::Continue,
        };

        match outcome {
            ControllerOutcome::Continue => HitlOutcome::Continue,
            ControllerOutcome::Interrupted(checkpoint) => HitlOutcome::Interrupted { checkpoint_id: checkpoint.checkpoint_id },
        }
    }
}

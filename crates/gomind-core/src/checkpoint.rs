//! HITL checkpoint types (§3, §4.9).

use crate::plan::{PlanMode, RoutingPlan, RoutingStep};
use crate::result::StepResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;

/// Where in the execution lifecycle a checkpoint was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPoint {
    PlanGenerated,
    BeforeStep,
    AfterStep,
    OnError,
}

/// How a checkpoint should behave if it is never actioned before `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryBehavior {
    ImplicitDeny,
    ApplyDefault,
}

/// The default action to apply on expiry (or via a `skip`/`approve` command)
/// when the policy doesn't otherwise specify one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    Approve,
    Reject,
    Abort,
}

/// A policy's verdict at a single HITL check point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptDecision {
    pub should_interrupt: bool,
    pub reason: String,
    pub message: String,
    pub priority: u8,
    pub timeout: std::time::Duration,
    pub default_action: DefaultAction,
    pub streaming_expiry_behavior: ExpiryBehavior,
    pub non_streaming_expiry_behavior: ExpiryBehavior,
    pub default_request_mode: PlanMode,
}

impl InterruptDecision {
    /// A decision that never interrupts — the fast path most policy checks take.
    pub fn no_interrupt() -> Self {
        Self {
            should_interrupt: false,
            reason: String::new(),
            message: String::new(),
            priority: 0,
            timeout: std::time::Duration::from_secs(24 * 3600),
            default_action: DefaultAction::Reject,
            streaming_expiry_behavior: ExpiryBehavior::ImplicitDeny,
            non_streaming_expiry_behavior: ExpiryBehavior::ApplyDefault,
            default_request_mode: PlanMode::NonStreaming,
        }
    }
}

/// Checkpoint lifecycle status (§3). Transitions are monotone: `Pending` to
/// exactly one terminal status, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
    Edited,
    Aborted,
    Expired,
    ExpiredApproved,
    ExpiredRejected,
    ExpiredAborted,
    Completed,
}

impl CheckpointStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckpointStatus::Pending)
    }
}

/// A persisted snapshot at a HITL interrupt point, carrying everything needed
/// to resume (§3 ExecutionCheckpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCheckpoint {
    pub checkpoint_id: String,
    pub request_id: String,
    pub original_request_id: String,
    pub interrupt_point: InterruptPoint,
    pub decision: InterruptDecision,
    pub plan: RoutingPlan,
    pub completed_steps: Vec<String>,
    pub current_step: Option<RoutingStep>,
    pub current_step_result: Option<StepResult>,
    pub step_results: HashMap<String, StepResult>,
    pub resolved_parameters: HashMap<String, Json>,
    pub original_request: String,
    pub user_context: HashMap<String, Json>,
    pub request_mode: PlanMode,
    pub original_trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CheckpointStatus,
}

impl ExecutionCheckpoint {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

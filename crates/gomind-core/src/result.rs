//! Execution result types produced by the DAG Executor (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of a single step's attempt group. Retries overwrite this in place;
/// only the last attempt's outcome is kept as the step's final result, but
/// the attempt history is preserved on [`StepAttempts`] for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub agent_name: String,
    pub success: bool,
    pub response: Option<String>,
    pub parsed_output: Option<Json>,
    pub error: Option<String>,
    pub http_status: Option<u16>,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
}

impl StepResult {
    pub fn failed(step_id: &str, agent_name: &str, error: impl Into<String>, start_time: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            step_id: step_id.to_string(),
            agent_name: agent_name.to_string(),
            success: false,
            response: None,
            parsed_output: None,
            error: Some(error.into()),
            http_status: None,
            start_time,
            duration,
        }
    }
}

/// Full attempt history for one step across resilience/correction retries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepAttempts {
    pub attempts: Vec<StepResult>,
}

impl StepAttempts {
    pub fn push(&mut self, result: StepResult) {
        self.attempts.push(result);
    }

    /// The outcome of the last attempt is the step's outcome (contract in §4.5).
    pub fn last(&self) -> Option<&StepResult> {
        self.attempts.last()
    }
}

/// Aggregate result of running one [`crate::plan::RoutingPlan`] end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: String,
    pub success: bool,
    pub steps: Vec<StepResult>,
    pub total_duration: Duration,
    #[serde(default)]
    pub metadata: HashMap<String, Json>,
}

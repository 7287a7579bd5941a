//! Routing plan types produced by the Planner and consumed by the DAG Executor (§3).

use crate::value::ParamValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-step metadata: which capability it invokes and the (possibly
/// templated) parameters to bind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepMetadata {
    #[serde(default)]
    pub capability: String,
    #[serde(default)]
    pub parameters: HashMap<String, ParamValue>,
}

/// A single node in the execution DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingStep {
    pub step_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub metadata: StepMetadata,
}

/// Execution mode requested for a plan (affects HITL expiry behavior, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Streaming,
    NonStreaming,
}

/// An immutable execution plan produced by the Planner from a user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPlan {
    pub plan_id: String,
    pub original_request: String,
    pub mode: PlanMode,
    pub steps: Vec<RoutingStep>,
    pub created_at: DateTime<Utc>,
}

/// Errors raised while validating an ingested plan (§4.4 step 4, §8.2).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("plan has no steps")]
    EmptySteps,
    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),
    #[error("step {step} depends on unknown or non-preceding step {dependency}")]
    InvalidDependency { step: String, dependency: String },
    #[error("step {0} references an unknown agent")]
    UnknownAgent(String),
}

impl RoutingPlan {
    /// Validates structural invariants: non-empty steps, no duplicate ids,
    /// `depends_on` only references earlier step ids (this also rules out
    /// cycles, since a step can never depend on itself or a later step),
    /// and every referenced agent exists in the given catalog agent name set.
    pub fn validate(&self, known_agents: &std::collections::HashSet<String>) -> Result<(), PlanValidationError> {
        if self.steps.is_empty() {
            return Err(PlanValidationError::EmptySteps);
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.step_id.clone()) {
                return Err(PlanValidationError::DuplicateStepId(step.step_id.clone()));
            }
        }

        let mut seen_so_far = std::collections::HashSet::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen_so_far.contains(dep) {
                    return Err(PlanValidationError::InvalidDependency {
                        step: step.step_id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            seen_so_far.insert(step.step_id.clone());

            if !known_agents.contains(&step.agent_name) {
                return Err(PlanValidationError::UnknownAgent(step.agent_name.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn step(id: &str, deps: &[&str]) -> RoutingStep {
        RoutingStep {
            step_id: id.to_string(),
            agent_name: "agent-a".to_string(),
            namespace: String::new(),
            instruction: String::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            metadata: StepMetadata::default(),
        }
    }

    fn plan(steps: Vec<RoutingStep>) -> RoutingPlan {
        RoutingPlan {
            plan_id: "p1".into(),
            original_request: "req".into(),
            mode: PlanMode::NonStreaming,
            steps,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_forward_reference_as_cycle_guard() {
        let agents: HashSet<String> = ["agent-a".to_string()].into_iter().collect();
        let p = plan(vec![step("step-1", &["step-2"]), step("step-2", &[])]);
        assert_eq!(
            p.validate(&agents),
            Err(PlanValidationError::InvalidDependency {
                step: "step-1".into(),
                dependency: "step-2".into()
            })
        );
    }

    #[test]
    fn accepts_valid_dag() {
        let agents: HashSet<String> = ["agent-a".to_string()].into_iter().collect();
        let p = plan(vec![step("step-1", &[]), step("step-2", &["step-1"])]);
        assert!(p.validate(&agents).is_ok());
    }

    #[test]
    fn rejects_unknown_agent() {
        let agents: HashSet<String> = HashSet::new();
        let p = plan(vec![step("step-1", &[])]);
        assert_eq!(
            p.validate(&agents),
            Err(PlanValidationError::UnknownAgent("agent-a".into()))
        );
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let agents: HashSet<String> = ["agent-a".to_string()].into_iter().collect();
        let p = plan(vec![step("step-1", &[]), step("step-1", &[])]);
        assert_eq!(p.validate(&agents), Err(PlanValidationError::DuplicateStepId("step-1".into())));
    }
}

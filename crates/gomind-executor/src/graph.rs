//! Step readiness and skip propagation over a [`RoutingPlan`].

use gomind_core::RoutingStep;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }
}

/// Returns the `step_id`s of every `Pending` step whose `depends_on` entries
/// are all `Completed` (§4.6 step 2a). A dependency that is `Skipped` does
/// not satisfy readiness — skip is treated as "terminal, not satisfied".
pub fn ready_steps<'a>(steps: &'a [RoutingStep], status: &HashMap<String, StepStatus>) -> Vec<&'a RoutingStep> {
    steps
        .iter()
        .filter(|step| status.get(&step.step_id) == Some(&StepStatus::Pending))
        .filter(|step| {
            step.depends_on
                .iter()
                .all(|dep| status.get(dep) == Some(&StepStatus::Completed))
        })
        .collect()
}

/// Marks every step transitively depending on `failed_step_id` as `Skipped`
/// (§4.6 step 2c). Operates on a precomputed reverse-dependency index so
/// repeated calls (one per newly failed step) stay linear.
pub fn skip_transitive_dependents(
    steps: &[RoutingStep],
    failed_step_id: &str,
    status: &mut HashMap<String, StepStatus>,
) {
    let dependents: HashMap<&str, Vec<&str>> = {
        let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in steps {
            for dep in &step.depends_on {
                map.entry(dep.as_str()).or_default().push(step.step_id.as_str());
            }
        }
        map
    };

    let mut queue: Vec<String> = vec![failed_step_id.to_string()];
    let mut visited: HashSet<String> = HashSet::new();
    while let Some(current) = queue.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(children) = dependents.get(current.as_str()) {
            for child in children {
                if matches!(status.get(*child), Some(StepStatus::Pending)) {
                    status.insert(child.to_string(), StepStatus::Skipped);
                    queue.push(child.to_string());
                }
            }
        }
    }
}

/// True once every step has reached a terminal status.
pub fn all_terminal(steps: &[RoutingStep], status: &HashMap<String, StepStatus>) -> bool {
    steps.iter().all(|s| status.get(&s.step_id).is_some_and(StepStatus::is_terminal))
}

/// Overall success iff every non-skipped step completed (§4.6 step 3).
pub fn aggregate_success(steps: &[RoutingStep], status: &HashMap<String, StepStatus>) -> bool {
    steps
        .iter()
        .all(|s| matches!(status.get(&s.step_id), Some(StepStatus::Completed) | Some(StepStatus::Skipped)))
}

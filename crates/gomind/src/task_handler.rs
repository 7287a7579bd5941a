//! Bridges the Task Queue (§4.11) to [`Orchestrator::process_request`], so a
//! request can be submitted for asynchronous processing instead of awaited
//! inline. Task and checkpoint lifecycles stay separately owned (§3
//! "Ownership"); this only tracks which checkpoint (if any) a task's run
//! raised, so cancelling the task can also abort that checkpoint rather than
//! leaving it pending forever (§9 design notes, Open Question 3).

use crate::orchestrator::{Orchestrator, ProcessOutcome};
use dashmap::DashMap;
use gomind_core::{GoMindError, PlanMode, RequestContext, RequestMetadata, Task, TaskError};
use gomind_queue::{ProgressReporter, TaskHandler, TaskStore, TaskStoreError};
use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;

pub const REQUEST_TASK_TYPE: &str = "process_request";

#[derive(Debug, Deserialize)]
struct RequestTaskInput {
    request: String,
    #[serde(default)]
    metadata: RequestMetadata,
    #[serde(default = "default_mode")]
    mode: PlanMode,
    #[serde(default)]
    user_context: HashMap<String, Json>,
}

fn default_mode() -> PlanMode {
    PlanMode::NonStreaming
}

/// A [`TaskHandler`] for `task.type == "process_request"`, dispatching into
/// the orchestrator from a worker pool instead of the caller's own task.
pub struct RequestTaskHandler {
    orchestrator: Arc<Orchestrator>,
    pending_checkpoints: DashMap<String, String>,
}

impl RequestTaskHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator, pending_checkpoints: DashMap::new() }
    }

    /// Cancels the task in `store`, then aborts the checkpoint its run
    /// raised, if any is still on file. Best-effort: a checkpoint that has
    /// already been actioned by an operator is left alone.
    pub async fn cancel(&self, store: &dyn TaskStore, task_id: &str) -> Result<(), TaskStoreError> {
        store.cancel(task_id).await?;
        if let Some((_, checkpoint_id)) = self.pending_checkpoints.remove(task_id) {
            let _ = self.orchestrator.abort_checkpoint(&checkpoint_id).await;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskHandler for RequestTaskHandler {
    async fn handle(&self, task: &Task, progress: ProgressReporter) -> Result<Json, TaskError> {
        let input: RequestTaskInput = serde_json::from_value(task.input.clone()).map_err(|err| TaskError {
            code: "invalid_input".to_string(),
            message: err.to_string(),
            details: None,
        })?;

        progress.report(Some(0.0), Some("planning".to_string())).await;

        let ctx = RequestContext::new(task.id.clone());
        let outcome = self
            .orchestrator
            .process_request(&input.request, input.metadata, input.mode, &ctx, input.user_context)
            .await
            .map_err(|err: GoMindError| TaskError { code: err.code().to_string(), message: err.to_string(), details: None })?;

        match outcome {
            ProcessOutcome::Completed { result, answer } => {
                progress.report(Some(100.0), Some("done".to_string())).await;
                Ok(json!({ "answer": answer, "success": result.success }))
            }
            ProcessOutcome::Interrupted { checkpoint_id } => {
                self.pending_checkpoints.insert(task.id.clone(), checkpoint_id.clone());
                progress.report(None, Some("awaiting human approval".to_string())).await;
                Ok(json!({ "interrupted_checkpoint_id": checkpoint_id }))
            }
            ProcessOutcome::Aborted { checkpoint_id, reason } => Ok(json!({ "aborted_checkpoint_id": checkpoint_id, "reason": reason })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gomind_binding::ErrorAnalyzer;
    use gomind_catalog::{Catalog, DefaultCapabilityProvider, Discovery, DiscoveryError};
    use gomind_core::{AgentRecord, Capability, CapabilityParameter, RecordType, TaskOptions};
    use gomind_executor::{DagExecutor, ExecutorConfig, SynthesisStrategy, Synthesizer};
    use gomind_hitl::{CommandBus, HitlController, InMemoryCheckpointStore, NoopNotifier, RuleBasedPolicy, RuleBasedPolicyConfig};
    use gomind_llm::{ChatCompletionRequest, ChatCompletionResponse, DefaultPromptBuilder, LlmClient, LlmError};
    use gomind_planner::{Planner, SimpleCache};
    use gomind_queue::InMemoryTaskStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedPlanLlm(String);

    #[async_trait]
    impl LlmClient for FixedPlanLlm {
        fn name(&self) -> &str {
            "fixed-plan-llm"
        }

        async fn chat(&self, _request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
            Ok(ChatCompletionResponse { content: self.0.clone() })
        }
    }

    fn plan_json(capability: &str) -> String {
        json!({
            "plan_id": "plan-1",
            "original_request": "echo hi",
            "mode": "non_streaming",
            "steps": [{
                "step_id": "step-1",
                "agent_name": "echo-agent",
                "namespace": "default",
                "instruction": "echo",
                "depends_on": [],
                "metadata": { "capability": capability, "parameters": { "text": "hi" } }
            }]
        })
        .to_string()
    }

    async fn orchestrator_with_sensitive_capability(mock_uri: &str) -> Arc<Orchestrator> {
        let rest = mock_uri.trim_start_matches("http://");
        let (host, port) = rest.split_once(':').unwrap();
        let agent = AgentRecord {
            id: "a1".to_string(),
            name: "echo-agent".to_string(),
            record_type: RecordType::Agent,
            address: host.to_string(),
            port: port.parse().unwrap(),
            capabilities: vec![Capability {
                name: "echo".to_string(),
                description: "echoes input".to_string(),
                endpoint: "/echo".to_string(),
                parameters: vec![CapabilityParameter { name: "text".to_string(), type_name: "string".to_string(), required: true, description: String::new() }],
                agent_name: "echo-agent".to_string(),
            }],
            health: Default::default(),
        };
        struct Fixed(AgentRecord);
        #[async_trait]
        impl Discovery for Fixed {
            async fn discover(&self) -> Result<Vec<AgentRecord>, DiscoveryError> {
                Ok(vec![self.0.clone()])
            }
        }
        let catalog = Arc::new(Catalog::new(Arc::new(Fixed(agent))));
        catalog.refresh().await;

        let capability_provider = Arc::new(DefaultCapabilityProvider::new(catalog.clone()));
        let llm = Arc::new(FixedPlanLlm(plan_json("echo")));
        let planner = Arc::new(Planner::new(llm, Arc::new(DefaultPromptBuilder), SimpleCache::new(Duration::from_secs(60), 10)));
        let executor = Arc::new(DagExecutor::new(Arc::new(ErrorAnalyzer::new(None)), None, ExecutorConfig::default()));
        let synthesizer = Arc::new(Synthesizer::new(None, SynthesisStrategy::Concatenation));

        let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());
        let mut config = RuleBasedPolicyConfig::default();
        config.sensitive_capabilities.insert("echo".to_string());
        let hitl = Arc::new(HitlController::new(Arc::new(RuleBasedPolicy::new(config)), checkpoint_store.clone(), Arc::new(CommandBus::new()), Arc::new(NoopNotifier)));

        Arc::new(Orchestrator::new(catalog, capability_provider, planner, executor, synthesizer, hitl, checkpoint_store))
    }

    #[tokio::test]
    async fn cancelling_a_task_aborts_the_checkpoint_it_raised() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/echo")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"echo": "hi"}))).mount(&mock_server).await;

        let orchestrator = orchestrator_with_sensitive_capability(&mock_server.uri()).await;
        let handler = RequestTaskHandler::new(orchestrator.clone());
        let task_store = Arc::new(InMemoryTaskStore::new());

        let task = Task::new("task-1".to_string(), REQUEST_TASK_TYPE.to_string(), json!({"request": "echo hi"}), TaskOptions::default());
        task_store.put(task.clone()).await;
        let reporter = ProgressReporter::new(task_store.clone(), task.id.clone());

        let result = handler.handle(&task, reporter).await.unwrap();
        let checkpoint_id = result["interrupted_checkpoint_id"].as_str().unwrap().to_string();
        assert!(handler.pending_checkpoints.contains_key(&task.id));

        handler.cancel(task_store.as_ref(), &task.id).await.unwrap();

        assert!(!handler.pending_checkpoints.contains_key(&task.id));
        let second_abort = orchestrator.abort_checkpoint(&checkpoint_id).await;
        assert!(matches!(second_abort, Err(GoMindError::InvalidCommand(_))), "checkpoint was already aborted by cancel()");
    }
}

//! End-to-end scenarios driving the full facade: catalog discovery, planning,
//! HITL gating, DAG execution against a mocked agent, and resume after a
//! human command.

use async_trait::async_trait;
use chrono::Utc;
use gomind::orchestrator::{Orchestrator, ProcessOutcome};
use gomind_binding::ErrorAnalyzer;
use gomind_catalog::{Catalog, Discovery, DiscoveryError, DefaultCapabilityProvider};
use gomind_core::{
    AgentRecord, Capability, CapabilityParameter, Command, CommandType, PlanMode, RecordType, RequestContext, RequestMetadata,
};
use gomind_executor::{DagExecutor, ExecutorConfig, Synthesizer, SynthesisStrategy};
use gomind_hitl::{CommandBus, HitlController, InMemoryCheckpointStore, NoopNotifier, RuleBasedPolicy, RuleBasedPolicyConfig};
use gomind_llm::{ChatCompletionRequest, ChatCompletionResponse, LlmClient, LlmError};
use gomind_planner::{Planner, SimpleCache};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedPlanLlm {
    plan_json: String,
}

#[async_trait]
impl LlmClient for FixedPlanLlm {
    fn name(&self) -> &str {
        "fixed-plan-llm"
    }

    async fn chat(&self, _request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
        Ok(ChatCompletionResponse { content: self.plan_json.clone() })
    }
}

struct StaticDiscovery(Vec<AgentRecord>);

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover(&self) -> Result<Vec<AgentRecord>, DiscoveryError> {
        Ok(self.0.clone())
    }
}

fn weather_agent(base_url: &str, capability: &str) -> AgentRecord {
    let (address, port) = split_url(base_url);
    AgentRecord {
        id: "agent-1".to_string(),
        name: "weather-agent".to_string(),
        record_type: RecordType::Agent,
        address,
        port,
        capabilities: vec![Capability {
            name: capability.to_string(),
            description: "reports current weather".to_string(),
            endpoint: "/forecast".to_string(),
            parameters: vec![CapabilityParameter {
                name: "place".to_string(),
                type_name: "string".to_string(),
                required: true,
                description: String::new(),
            }],
            agent_name: "weather-agent".to_string(),
        }],
        health: Default::default(),
    }
}

fn split_url(base_url: &str) -> (String, u16) {
    let rest = base_url.trim_start_matches("http://");
    let (host, port) = rest.split_once(':').unwrap();
    (host.to_string(), port.parse().unwrap())
}

fn plan_json(plan_id: &str, capability: &str) -> String {
    json!({
        "plan_id": plan_id,
        "original_request": "what's the weather in paris",
        "mode": "non_streaming",
        "steps": [{
            "step_id": "step-1",
            "agent_name": "weather-agent",
            "namespace": "default",
            "instruction": "look up the forecast",
            "depends_on": [],
            "metadata": { "capability": capability, "parameters": { "place": "paris" } }
        }]
    })
    .to_string()
}

/// Wires an [`Orchestrator`] around a single mocked agent whose one capability
/// is named `capability`, planning via a fixed-response LLM.
async fn build_orchestrator(mock_server: &MockServer, capability: &str, policy_config: RuleBasedPolicyConfig) -> (Orchestrator, Arc<InMemoryCheckpointStore>) {
    let discovery = Arc::new(StaticDiscovery(vec![weather_agent(&mock_server.uri(), capability)]));
    let catalog = Arc::new(Catalog::new(discovery));
    catalog.refresh().await;

    let capability_provider = Arc::new(DefaultCapabilityProvider::new(catalog.clone()));
    let llm = Arc::new(FixedPlanLlm { plan_json: plan_json("plan-1", capability) });
    let prompt_builder = Arc::new(gomind_llm::DefaultPromptBuilder);
    let cache = SimpleCache::new(Duration::from_secs(60), 100);
    let planner = Arc::new(Planner::new(llm, prompt_builder, cache));

    let error_analyzer = Arc::new(ErrorAnalyzer::new(None));
    let executor = Arc::new(DagExecutor::new(error_analyzer, None, ExecutorConfig::default()));
    let synthesizer = Arc::new(Synthesizer::new(None, SynthesisStrategy::Concatenation));

    let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());
    let hitl = Arc::new(HitlController::new(
        Arc::new(RuleBasedPolicy::new(policy_config)),
        checkpoint_store.clone(),
        Arc::new(CommandBus::new()),
        Arc::new(NoopNotifier),
    ));

    let orchestrator = Orchestrator::new(catalog, capability_provider, planner, executor, synthesizer, hitl, checkpoint_store.clone());
    (orchestrator, checkpoint_store)
}

#[tokio::test]
async fn plan_runs_to_completion_with_no_hitl_interrupt() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp_c": 18})))
        .mount(&mock_server)
        .await;

    let (orchestrator, _store) = build_orchestrator(&mock_server, "forecast", RuleBasedPolicyConfig::default()).await;

    let ctx = RequestContext::new("req-1");
    let outcome = orchestrator
        .process_request("what's the weather in paris", RequestMetadata::default(), PlanMode::NonStreaming, &ctx, HashMap::new())
        .await
        .unwrap();

    match outcome {
        ProcessOutcome::Completed { result, answer } => {
            assert!(result.success);
            assert!(answer.contains("weather-agent"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn sensitive_plan_interrupts_and_resumes_after_approval() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp_c": 18})))
        .mount(&mock_server)
        .await;

    let mut policy_config = RuleBasedPolicyConfig::default();
    policy_config.sensitive_capabilities.insert("forecast".to_string());
    let (orchestrator, store) = build_orchestrator(&mock_server, "forecast", policy_config).await;

    let ctx = RequestContext::new("req-1");
    let outcome = orchestrator
        .process_request("what's the weather in paris", RequestMetadata::default(), PlanMode::NonStreaming, &ctx, HashMap::new())
        .await
        .unwrap();

    let checkpoint_id = match outcome {
        ProcessOutcome::Interrupted { checkpoint_id } => checkpoint_id,
        other => panic!("expected an interrupt, got {other:?}"),
    };

    let pending = store.get(&checkpoint_id).await.unwrap();
    assert_eq!(pending.status, gomind_core::CheckpointStatus::Pending);

    let approve = Command {
        command_id: "cmd-1".to_string(),
        checkpoint_id: checkpoint_id.clone(),
        command_type: CommandType::Approve,
        edited_plan: None,
        edited_step: None,
        edited_params: None,
        feedback: None,
        response: None,
        user_id: "operator".to_string(),
        timestamp: Utc::now(),
    };
    orchestrator.process_command(approve).await.unwrap();

    let outcome = orchestrator.resume(&checkpoint_id, None).await.unwrap();
    match outcome {
        ProcessOutcome::Completed { result, .. } => assert!(result.success),
        other => panic!("expected completion after resume, got {other:?}"),
    }

    let completed = store.get(&checkpoint_id).await.unwrap();
    assert_eq!(completed.status, gomind_core::CheckpointStatus::Completed);
}

#[tokio::test]
async fn rejected_checkpoint_aborts_without_re_invoking_the_executor() {
    let mock_server = MockServer::start().await;
    // No mock mounted for /forecast: if the executor were invoked after a
    // rejection, the call would fail the test via wiremock's unmatched-request panic.

    let mut policy_config = RuleBasedPolicyConfig::default();
    policy_config.sensitive_capabilities.insert("forecast".to_string());
    let (orchestrator, _store) = build_orchestrator(&mock_server, "forecast", policy_config).await;

    let ctx = RequestContext::new("req-1");
    let outcome = orchestrator
        .process_request("what's the weather in paris", RequestMetadata::default(), PlanMode::NonStreaming, &ctx, HashMap::new())
        .await
        .unwrap();

    let checkpoint_id = match outcome {
        ProcessOutcome::Interrupted { checkpoint_id } => checkpoint_id,
        other => panic!("expected an interrupt, got {other:?}"),
    };

    let reject = Command {
        command_id: "cmd-1".to_string(),
        checkpoint_id: checkpoint_id.clone(),
        command_type: CommandType::Reject,
        edited_plan: None,
        edited_step: None,
        edited_params: None,
        feedback: Some("not authorized".to_string()),
        response: None,
        user_id: "operator".to_string(),
        timestamp: Utc::now(),
    };
    orchestrator.process_command(reject).await.unwrap();

    let outcome = orchestrator.resume(&checkpoint_id, None).await.unwrap();
    match outcome {
        ProcessOutcome::Aborted { checkpoint_id: id, .. } => assert_eq!(id, checkpoint_id),
        other => panic!("expected an abort, got {other:?}"),
    }
}

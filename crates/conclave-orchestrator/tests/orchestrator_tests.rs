//! Integration tests for the Orchestration Service, covering the message-
//! handling algorithm's scenarios (spec §8): plain text turns, tool calls,
//! HITL rejection, a disallowed tool, an agent switch via `switch_mode`,
//! and the LLM circuit breaker tripping and recovering.

use conclave_agent::{AgentRegistry, RegistryMode};
use conclave_core::{AgentType, Chunk, FinishReason, HitlDecision, SessionKey};
use conclave_events::EventBus;
use conclave_hitl::HitlService;
use conclave_llm::{ChatRequest, ChatStream, LlmClient, LlmClientError, LlmClientResult, StreamDelta};
use conclave_orchestrator::Orchestrator;
use conclave_resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};
use conclave_session::{AgentContextService, SessionLockManager, SessionService};
use conclave_storage::{connect, migrate, AgentContextRepository, ApprovalRepository, MessageRepository, PoolConfig, SessionRepository};
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Hands back one scripted response per call, in order. Panics if exhausted
/// so a test's expectations about call count are enforced, not silently
/// papered over.
struct MockLlmClient {
    responses: Mutex<VecDeque<Vec<LlmClientResult<StreamDelta>>>>,
}

impl MockLlmClient {
    fn new(responses: Vec<Vec<LlmClientResult<StreamDelta>>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete_stream(
        &self,
        _request: ChatRequest,
        _cancel: Option<CancellationToken>,
    ) -> LlmClientResult<ChatStream> {
        let items = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock llm client ran out of scripted responses");
        Ok(Box::pin(stream::iter(items)))
    }
}

fn text_then_stop(text: &str) -> Vec<LlmClientResult<StreamDelta>> {
    vec![
        Ok(StreamDelta::Text(text.to_string())),
        Ok(StreamDelta::Done { finish_reason: FinishReason::Stop, usage: None }),
    ]
}

fn tool_call(id: &str, name: &str, arguments_json: &str) -> Vec<LlmClientResult<StreamDelta>> {
    vec![
        Ok(StreamDelta::ToolCallStart { id: id.to_string(), name: name.to_string() }),
        Ok(StreamDelta::ToolCallDelta { id: id.to_string(), arguments: arguments_json.to_string() }),
        Ok(StreamDelta::ToolCallEnd { id: id.to_string() }),
        Ok(StreamDelta::Done { finish_reason: FinishReason::ToolCalls, usage: None }),
    ]
}

fn failing_request() -> Vec<LlmClientResult<StreamDelta>> {
    vec![Err(LlmClientError::RequestFailed("503 service unavailable".to_string()))]
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionService>,
    contexts: Arc<AgentContextService>,
    hitl: Arc<HitlService>,
    registry: Arc<AgentRegistry>,
    _dir: tempfile::TempDir,
}

impl Harness {
    async fn new(responses: Vec<Vec<LlmClientResult<StreamDelta>>>) -> Self {
        Self::with_resilience(responses, CircuitBreakerConfig::default(), RetryConfig { max_attempts: 1, ..RetryConfig::default() }).await
    }

    async fn with_resilience(
        responses: Vec<Vec<LlmClientResult<StreamDelta>>>,
        breaker_config: CircuitBreakerConfig,
        retry_config: RetryConfig,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("orchestrator.db");
        let pool = connect(&PoolConfig {
            database_url: format!("sqlite://{}", db_path.display()),
            ..Default::default()
        })
        .await
        .unwrap();
        migrate(&pool).await.unwrap();

        let events = Arc::new(EventBus::new(128));
        let sessions = Arc::new(SessionService::new(
            SessionRepository::new(pool.clone()),
            MessageRepository::new(pool.clone()),
            events.clone(),
        ));
        let contexts = Arc::new(AgentContextService::new(AgentContextRepository::new(pool.clone()), events.clone()));
        let hitl = Arc::new(HitlService::new(ApprovalRepository::new(pool.clone()), events.clone()));
        let locks = Arc::new(SessionLockManager::new());
        let registry = Arc::new(AgentRegistry::new(RegistryMode::MultiAgent));

        let mock: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new(responses));
        let breaker = CircuitBreaker::new(breaker_config);
        let llm: Arc<dyn LlmClient> =
            Arc::new(conclave_llm::ResilientLlmClient::new(mock, breaker, retry_config));

        let orchestrator = Arc::new(Orchestrator::new(
            sessions.clone(),
            contexts.clone(),
            hitl.clone(),
            locks,
            registry.clone(),
            llm,
            events,
            "mock-model",
            50,
        ));

        Self { orchestrator, sessions, contexts, hitl, registry, _dir: dir }
    }

    async fn new_session(&self, agent: AgentType) -> SessionKey {
        let session = self.sessions.create_session("user-1").await.unwrap();
        if agent != self.registry.initial_agent() {
            self.contexts
                .switch(&session.id, self.registry.initial_agent(), agent, "test setup")
                .await
                .unwrap();
        }
        session.id
    }
}

async fn collect(stream: conclave_orchestrator::ChunkStream) -> Vec<Chunk> {
    stream.collect().await
}

fn find_session_info(chunks: &[Chunk]) -> SessionKey {
    chunks
        .iter()
        .find_map(|c| match c {
            Chunk::SessionInfo { session_id } => Some(session_id.clone()),
            _ => None,
        })
        .expect("expected a session_info chunk")
}

#[tokio::test]
async fn scenario_a_simple_qa() {
    let harness = Harness::new(vec![text_then_stop("Hello.")]).await;

    let chunks = collect(harness.orchestrator.process_message(None, "user-1".to_string(), "Hi".to_string(), None)).await;

    let session_id = find_session_info(&chunks);
    assert!(matches!(
        &chunks[1],
        Chunk::AssistantMessage { token, is_final: true } if token == "Hello."
    ));
    assert!(matches!(chunks.last(), Some(Chunk::Done)));

    let history = harness.sessions.get_history(&session_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content.as_deref(), Some("Hi"));
    assert_eq!(history[1].content.as_deref(), Some("Hello."));
}

#[tokio::test]
async fn scenario_b_tool_call_then_result() {
    let harness = Harness::new(vec![
        tool_call("c1", "read_file", r#"{"file_path":"main.py"}"#),
        text_then_stop("The file prints 'hi'."),
    ])
    .await;
    let session_id = harness.new_session(AgentType::Coder).await;

    let first = collect(harness.orchestrator.process_message(
        Some(session_id.clone()),
        "user-1".to_string(),
        "read main.py".to_string(),
        None,
    ))
    .await;
    assert!(matches!(
        first.as_slice(),
        [Chunk::ToolCall { call_id, tool_name, .. }] if call_id == "c1" && tool_name == "read_file"
    ));

    let second = collect(harness.orchestrator.process_tool_result(
        session_id.clone(),
        "c1".to_string(),
        "read_file".to_string(),
        "print('hi')".to_string(),
    ))
    .await;
    assert!(matches!(
        second.as_slice(),
        [Chunk::AssistantMessage { is_final: true, .. }, Chunk::Done]
    ));

    let history = harness.sessions.get_history(&session_id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content.as_deref(), Some("read main.py"));
    assert!(history[1].tool_calls.is_some());
    assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(history[2].content.as_deref(), Some("print('hi')"));
    assert_eq!(history[3].content.as_deref(), Some("The file prints 'hi'."));
}

#[tokio::test]
async fn scenario_c_hitl_rejection() {
    let harness = Harness::new(vec![
        tool_call("c2", "write_file", r#"{"file_path":"a.py","content":"x"}"#),
        text_then_stop("Understood; I won't write it."),
    ])
    .await;
    let session_id = harness.new_session(AgentType::Coder).await;

    let first = collect(harness.orchestrator.process_message(
        Some(session_id.clone()),
        "user-1".to_string(),
        "write a.py".to_string(),
        None,
    ))
    .await;
    assert!(matches!(
        first.as_slice(),
        [Chunk::HitlRequest { call_id, tool_name, .. }] if call_id == "c2" && tool_name == "write_file"
    ));

    let second = collect(harness.orchestrator.process_hitl_decision(
        session_id.clone(),
        "c2".to_string(),
        HitlDecision::Reject,
        Some("no".to_string()),
        None,
    ))
    .await;
    assert!(matches!(
        second.as_slice(),
        [Chunk::AssistantMessage { is_final: true, .. }, Chunk::Done]
    ));

    let history = harness.sessions.get_history(&session_id).await.unwrap();
    let rejection = history
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c2"))
        .expect("expected the rejection tool-result message");
    assert_eq!(rejection.content.as_deref(), Some("Rejected by user: no"));

    assert!(harness.hitl.list_pending(&session_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_d_disallowed_tool() {
    let harness = Harness::new(vec![
        tool_call("c3", "write_file", r#"{"file_path":"a.py","content":"x"}"#),
        text_then_stop("I can't write files; try the Coder agent."),
    ])
    .await;
    let session_id = harness.new_session(AgentType::Ask).await;

    let chunks = collect(harness.orchestrator.process_message(
        Some(session_id.clone()),
        "user-1".to_string(),
        "write a.py".to_string(),
        None,
    ))
    .await;
    assert!(matches!(
        chunks.as_slice(),
        [Chunk::AssistantMessage { is_final: true, .. }, Chunk::Done]
    ));

    let history = harness.sessions.get_history(&session_id).await.unwrap();
    let gate_failure = history
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c3"))
        .expect("expected the gate-failure tool-result message");
    assert!(gate_failure
        .content
        .as_deref()
        .unwrap()
        .contains("tool not allowed for agent ask"));
}

#[tokio::test]
async fn scenario_e_agent_switch_via_switch_mode() {
    let harness = Harness::new(vec![
        tool_call("c4", "switch_mode", r#"{"mode":"coder","reason":"needs code changes"}"#),
        text_then_stop("Done."),
    ])
    .await;
    let session_id = harness.new_session(AgentType::Ask).await;

    let chunks = collect(harness.orchestrator.process_message(
        Some(session_id.clone()),
        "user-1".to_string(),
        "please fix the bug".to_string(),
        None,
    ))
    .await;
    assert!(matches!(
        chunks.as_slice(),
        [Chunk::SwitchAgent { from_agent: AgentType::Ask, to_agent: AgentType::Coder, reason }]
            if reason == "needs code changes"
    ));

    let history = harness.sessions.get_history(&session_id).await.unwrap();
    let switch_message = history
        .iter()
        .find(|m| m.tool_calls.as_ref().map(|tc| tc.iter().any(|c| c.id == "c4")).unwrap_or(false))
        .expect("expected the assistant message carrying c4");
    assert!(history.iter().all(|m| m.tool_call_id.as_deref() != Some("c4")));
    let _ = switch_message;

    assert_eq!(
        harness.contexts.current_agent(&session_id, harness.registry.initial_agent()).await.unwrap(),
        AgentType::Coder
    );

    let next = collect(harness.orchestrator.process_message(
        Some(session_id.clone()),
        "user-1".to_string(),
        "go ahead".to_string(),
        None,
    ))
    .await;
    assert!(matches!(
        next.as_slice(),
        [Chunk::AssistantMessage { is_final: true, .. }, Chunk::Done]
    ));
}

#[tokio::test]
async fn scenario_f_llm_circuit_open_then_recovers() {
    let breaker_config = CircuitBreakerConfig {
        failure_threshold: 5,
        recovery_timeout: Duration::from_millis(50),
    };
    let retry_config = RetryConfig { max_attempts: 1, ..RetryConfig::default() };

    let mut responses: Vec<Vec<LlmClientResult<StreamDelta>>> = (0..5).map(|_| failing_request()).collect();
    responses.push(text_then_stop("back online"));
    let harness = Harness::with_resilience(responses, breaker_config, retry_config).await;
    let session_id = harness.new_session(AgentType::Orchestrator).await;

    for _ in 0..5 {
        let chunks = collect(harness.orchestrator.process_message(
            Some(session_id.clone()),
            "user-1".to_string(),
            "ping".to_string(),
            None,
        ))
        .await;
        assert!(matches!(chunks.last(), Some(Chunk::Error { is_final: true, .. })));
    }

    let tripped = collect(harness.orchestrator.process_message(
        Some(session_id.clone()),
        "user-1".to_string(),
        "ping".to_string(),
        None,
    ))
    .await;
    assert!(matches!(
        tripped.as_slice(),
        [Chunk::Error { kind, is_final: true, .. }] if kind == "circuit_open"
    ));

    tokio::time::sleep(Duration::from_millis(80)).await;

    let recovered = collect(harness.orchestrator.process_message(
        Some(session_id.clone()),
        "user-1".to_string(),
        "ping".to_string(),
        None,
    ))
    .await;
    assert!(matches!(
        recovered.as_slice(),
        [Chunk::AssistantMessage { token, is_final: true }, Chunk::Done] if token == "back online"
    ));
}

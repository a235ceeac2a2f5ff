//! Tests for conclave-llm: request construction, and the resilient wrapper's
//! retry/circuit-breaking behaviour.

use conclave_core::{AgentType, Message, SessionKey};
use conclave_llm::*;
use conclave_resilience::{CircuitBreakerConfig, RetryConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[test]
fn chat_request_defaults_and_builders() {
    let req = ChatRequest::new("test-model", vec![]);
    assert_eq!(req.model, "test-model");
    assert_eq!(req.max_tokens, Some(8192));
    assert!(req.tools.is_none());

    let req = req.with_system("be helpful");
    assert_eq!(req.system.as_deref(), Some("be helpful"));
}

#[test]
fn accumulated_tool_call_parses_empty_arguments_as_empty_object() {
    let call = AccumulatedToolCall {
        id: "c1".into(),
        name: "read_file".into(),
        arguments: String::new(),
    };
    assert_eq!(call.parse_arguments().unwrap(), serde_json::json!({}));
}

// A client that fails N times, then succeeds — used to exercise retry and
// the circuit breaker without talking to the network.
struct FlakyClient {
    fail_times: usize,
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl LlmClient for FlakyClient {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete_stream(
        &self,
        _request: ChatRequest,
        _cancel: Option<CancellationToken>,
    ) -> LlmClientResult<ChatStream> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            Err(LlmClientError::RateLimited { retry_after_ms: 1 })
        } else {
            Ok(Box::pin(futures::stream::iter(vec![])))
        }
    }
}

fn test_session() -> SessionKey {
    SessionKey::new("s1")
}

fn sample_request() -> ChatRequest {
    ChatRequest::new("test-model", vec![Message::user(test_session(), "hi")])
}

#[tokio::test]
async fn resilient_client_retries_transient_failures_then_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let inner = Arc::new(FlakyClient {
        fail_times: 2,
        calls: calls.clone(),
    });
    let breaker = conclave_resilience::CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 10,
        recovery_timeout: Duration::from_secs(60),
    });
    let retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        ..Default::default()
    };
    let client = ResilientLlmClient::new(inner, breaker, retry);

    let result = client.complete_stream(sample_request(), None).await;
    assert!(result.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn resilient_client_opens_circuit_after_repeated_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let inner = Arc::new(FlakyClient {
        fail_times: usize::MAX,
        calls: calls.clone(),
    });
    let breaker = conclave_resilience::CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1,
        recovery_timeout: Duration::from_secs(60),
    });
    let retry = RetryConfig {
        max_attempts: 1,
        ..Default::default()
    };
    let client = ResilientLlmClient::new(inner, breaker, retry);

    let first = client.complete_stream(sample_request(), None).await;
    assert!(first.is_err());

    let calls_before_second = calls.load(Ordering::SeqCst);
    let second = client.complete_stream(sample_request(), None).await;
    assert!(second.is_err());
    // circuit should be open now — the inner client must not have been called again
    assert_eq!(calls.load(Ordering::SeqCst), calls_before_second);
}

#[test]
fn agent_types_used_to_build_requests_round_trip_without_glue() {
    let _ = AgentType::Orchestrator;
    let req = sample_request();
    assert_eq!(req.messages.len(), 1);
}

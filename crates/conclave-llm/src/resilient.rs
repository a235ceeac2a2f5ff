//! Wraps any [`LlmClient`] with the shared circuit breaker and retry policy
//! (spec §4.5: circuit opens after 5 consecutive failures, retry caps at 3
//! attempts with exponential backoff).

use crate::client::{ChatStream, LlmClient, LlmClientResult};
use crate::error::LlmClientError;
use crate::types::ChatRequest;
use conclave_resilience::{retry_with_backoff, CircuitBreaker, CircuitError, RetryConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ResilientLlmClient {
    inner: Arc<dyn LlmClient>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, breaker: CircuitBreaker, retry: RetryConfig) -> Self {
        Self { inner, breaker, retry }
    }
}

#[async_trait::async_trait]
impl LlmClient for ResilientLlmClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    /// Note: only request *setup* (establishing the stream) is retried and
    /// circuit-broken. Once a stream is open, a mid-stream error surfaces to
    /// the caller directly — replaying partially-consumed output would risk
    /// duplicating assistant text already yielded to the client.
    async fn complete_stream(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmClientResult<ChatStream> {
        let inner = self.inner.clone();
        let retry_config = self.retry.clone();

        let result = self
            .breaker
            .call(move || {
                let request = request.clone();
                let cancel = cancel.clone();
                let inner = inner.clone();
                let retry_config = retry_config.clone();
                async move {
                    retry_with_backoff(&retry_config, move || {
                        let request = request.clone();
                        let cancel = cancel.clone();
                        let inner = inner.clone();
                        async move { inner.complete_stream(request, cancel).await }
                    })
                    .await
                }
            })
            .await;

        match result {
            Ok(stream) => Ok(stream),
            Err(CircuitError::Open) => Err(LlmClientError::CircuitOpen),
            Err(CircuitError::Inner(err)) => Err(err),
        }
    }
}

//! LLM driver errors, and their mapping onto the retry/circuit-breaker layer.

use conclave_resilience::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("circuit breaker open")]
    CircuitOpen,
}

impl Retryable for LlmClientError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmClientError::RateLimited { .. } | LlmClientError::StreamError(_)
        ) || matches!(self, LlmClientError::Network(e) if e.is_timeout() || e.is_connect())
            || matches!(self, LlmClientError::RequestFailed(msg) if msg.starts_with("503") || msg.starts_with("504"))
    }
}

impl From<LlmClientError> for conclave_core::LlmErrorKind {
    fn from(err: LlmClientError) -> Self {
        match err {
            LlmClientError::Cancelled => conclave_core::LlmErrorKind::Cancelled,
            other if other.is_retryable() => conclave_core::LlmErrorKind::Transient(other.to_string()),
            other => conclave_core::LlmErrorKind::Permanent(other.to_string()),
        }
    }
}

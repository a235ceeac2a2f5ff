//! The `LlmClient` trait — the seam the orchestrator drives, and the only
//! thing it knows about the external LLM proxy.

use crate::error::LlmClientError;
use crate::types::{ChatRequest, StreamDelta};
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type LlmClientResult<T> = Result<T, LlmClientError>;
pub type ChatStream = Pin<Box<dyn Stream<Item = LlmClientResult<StreamDelta>> + Send>>;

/// A client over an OpenAI-compatible chat-completions endpoint. Implementations
/// are expected to sit behind a circuit breaker and retry policy, not embed one —
/// see [`crate::resilient::ResilientLlmClient`].
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    /// Stream a completion. If `cancel` fires, the underlying connection is
    /// dropped and the stream yields `LlmClientError::Cancelled`.
    async fn complete_stream(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmClientResult<ChatStream>;
}

//! LLM Driver: builds chat-completion requests and drives streaming calls
//! against the external LLM proxy, behind retry and circuit-breaking.

pub mod client;
pub mod error;
pub mod openai_compatible;
pub mod resilient;
pub mod types;

pub use client::{ChatStream, LlmClient, LlmClientResult};
pub use error::LlmClientError;
pub use openai_compatible::OpenAiCompatibleClient;
pub use resilient::ResilientLlmClient;
pub use types::{AccumulatedToolCall, ChatRequest, StreamDelta, Usage};

//! Crate-wide error taxonomy (spec §7)

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session deleted: {0}")]
    SessionDeleted(String),

    #[error("tool not allowed: {tool} for agent {agent}")]
    ToolNotAllowed { tool: String, agent: String },

    #[error("llm error: {0}")]
    Llm(#[from] LlmErrorKind),

    #[error("circuit open")]
    CircuitOpen,

    #[error("rate limited")]
    RateLimited,

    #[error("lock timeout acquiring session {0}")]
    LockTimeout(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// LLM-layer error kinds, distinguishing transient (retryable) from permanent failures.
#[derive(Error, Debug, Clone)]
pub enum LlmErrorKind {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable kind string, used in `Error` chunks (spec §6.1) and HTTP mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::AuthFailed(_) => "auth_error",
            Error::SessionNotFound(_) => "session_not_found",
            Error::SessionDeleted(_) => "session_deleted",
            Error::ToolNotAllowed { .. } => "tool_not_allowed",
            Error::Llm(LlmErrorKind::Transient(_)) => "llm_transient",
            Error::Llm(LlmErrorKind::Permanent(_)) => "llm_permanent",
            Error::Llm(LlmErrorKind::Cancelled) => "cancelled",
            Error::CircuitOpen => "circuit_open",
            Error::RateLimited => "rate_limited",
            Error::LockTimeout(_) => "lock_timeout",
            Error::Persistence(_) => "persistence_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// HTTP status this error taxonomy maps to at the gateway boundary (spec §7 table).
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::AuthFailed(_) => 401,
            Error::SessionNotFound(_) | Error::SessionDeleted(_) => 404,
            Error::RateLimited => 429,
            Error::LockTimeout(_) => 409,
            _ => 500,
        }
    }
}

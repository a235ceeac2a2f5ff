//! Event taxonomy (spec §3 "Event").

use chrono::{DateTime, Utc};
use conclave_core::{AgentType, SessionKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionCreated,
    MessageAppended,
    AgentSwitched,
    ToolCallEmitted,
    ToolResultReceived,
    HitlRequested,
    HitlDecided,
    LlmRequestStarted,
    LlmRequestCompleted,
    LlmRequestFailed,
    SystemStartup,
    SystemShutdown,
}

/// One published occurrence. Every variant carries the envelope fields
/// (`event_id`, `timestamp`, `session_id?`, `correlation_id?`) plus a
/// type-specific payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<SessionKey>,
    pub correlation_id: Option<String>,
    pub payload: EventPayload,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SessionCreated {
        user_id: String,
    },
    MessageAppended {
        message_id: String,
        role: String,
    },
    AgentSwitched {
        from: AgentType,
        to: AgentType,
        reason: String,
    },
    ToolCallEmitted {
        call_id: String,
        tool_name: String,
    },
    ToolResultReceived {
        call_id: String,
        tool_name: String,
        is_error: bool,
    },
    HitlRequested {
        call_id: String,
        tool_name: String,
    },
    HitlDecided {
        call_id: String,
        decision: String,
    },
    LlmRequestStarted {
        model: String,
    },
    LlmRequestCompleted {
        model: String,
        duration_ms: u64,
        finish_reason: String,
    },
    LlmRequestFailed {
        model: String,
        error_kind: String,
    },
    SystemStartup,
    SystemShutdown,
}

impl Event {
    pub fn new(payload: EventPayload, session_id: Option<SessionKey>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session_id,
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::SessionCreated { .. } => EventType::SessionCreated,
            EventPayload::MessageAppended { .. } => EventType::MessageAppended,
            EventPayload::AgentSwitched { .. } => EventType::AgentSwitched,
            EventPayload::ToolCallEmitted { .. } => EventType::ToolCallEmitted,
            EventPayload::ToolResultReceived { .. } => EventType::ToolResultReceived,
            EventPayload::HitlRequested { .. } => EventType::HitlRequested,
            EventPayload::HitlDecided { .. } => EventType::HitlDecided,
            EventPayload::LlmRequestStarted { .. } => EventType::LlmRequestStarted,
            EventPayload::LlmRequestCompleted { .. } => EventType::LlmRequestCompleted,
            EventPayload::LlmRequestFailed { .. } => EventType::LlmRequestFailed,
            EventPayload::SystemStartup => EventType::SystemStartup,
            EventPayload::SystemShutdown => EventType::SystemShutdown,
        }
    }

    /// JSON projection used by `AuditLogger` and the `/events/metrics` endpoint.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

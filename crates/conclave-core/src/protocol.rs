//! Wire protocol for the streaming endpoint (spec §6.1)
//!
//! Request body:
//!   { "session_id": "<id-or-new_*>", "message": { "type": "user_message"|..., ... } }
//!
//! Response: `text/event-stream`; each `data:` line is a JSON-serialised [`Chunk`].

use crate::types::{AgentType, HitlDecision, SessionKey};
use serde::{Deserialize, Serialize};

/// Incoming request body for `POST /api/v1/messages/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequest {
    pub session_id: String,
    pub message: IncomingMessage,
}

/// The four request message variants (spec §6.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    UserMessage {
        content: String,
        #[serde(default)]
        agent_type: Option<String>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        result: ToolResultValue,
    },
    HitlDecision {
        call_id: String,
        decision: HitlDecision,
        #[serde(default)]
        feedback: Option<String>,
        #[serde(default)]
        modified_arguments: Option<serde_json::Value>,
    },
    SwitchAgent {
        agent_type: String,
        #[serde(default)]
        content: Option<String>,
    },
}

/// A tool result payload is either a raw string or a JSON object (spec §6.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultValue {
    Text(String),
    Json(serde_json::Value),
}

impl ToolResultValue {
    pub fn into_content_string(self) -> String {
        match self {
            ToolResultValue::Text(s) => s,
            ToolResultValue::Json(v) => serde_json::to_string(&v).unwrap_or_default(),
        }
    }
}

/// Finish reason reported by the LLM driver (spec §4.5 `Done`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
}

/// One logical frame yielded to the client by the orchestrator (spec §4.7 `Chunk`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    SessionInfo {
        session_id: SessionKey,
    },
    AssistantMessage {
        token: String,
        is_final: bool,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    HitlRequest {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    SwitchAgent {
        from_agent: AgentType,
        to_agent: AgentType,
        reason: String,
    },
    Error {
        kind: String,
        detail: String,
        is_final: bool,
    },
    Done,
}

impl Chunk {
    pub fn error(kind: impl Into<String>, detail: impl Into<String>, is_final: bool) -> Self {
        Chunk::Error {
            kind: kind.into(),
            detail: detail.into(),
            is_final,
        }
    }

    /// Whether this chunk ends the current server-to-client stream (spec §4.7 step exits).
    pub fn closes_stream(&self) -> bool {
        matches!(
            self,
            Chunk::Done
                | Chunk::ToolCall { .. }
                | Chunk::HitlRequest { .. }
                | Chunk::Error { is_final: true, .. }
        )
    }
}

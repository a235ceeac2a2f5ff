//! Core data model (spec §3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Opaque session identifier — cheaply cloneable.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A client-supplied id prefixed with `new_` asks the server to mint a
    /// fresh session (spec §6.1). An absent id behaves the same way.
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with("new_")
    }

    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The five specialist agents plus the Orchestrator and the single-agent-mode
/// Universal agent (spec §3 "Agent").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Orchestrator,
    Coder,
    Architect,
    Debug,
    Ask,
    Universal,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Orchestrator => "orchestrator",
            AgentType::Coder => "coder",
            AgentType::Architect => "architect",
            AgentType::Debug => "debug",
            AgentType::Ask => "ask",
            AgentType::Universal => "universal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "orchestrator" => Some(AgentType::Orchestrator),
            "coder" => Some(AgentType::Coder),
            "architect" => Some(AgentType::Architect),
            "debug" => Some(AgentType::Debug),
            "ask" => Some(AgentType::Ask),
            "universal" => Some(AgentType::Universal),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message role (spec §3 "Message").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call emitted by the assistant, accumulated from streaming deltas.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments as a JSON value — reassembled from streamed JSON text deltas.
    pub arguments: serde_json::Value,
}

/// A single message in a session's append-only log (spec §3 "Message").
///
/// `content` may be empty when an assistant message carries only tool_calls.
/// Messages are never mutated once persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: SessionKey,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    fn new(session_id: SessionKey, role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            role,
            content: None,
            name: None,
            tool_call_id: None,
            tool_calls: None,
            timestamp: Utc::now(),
            token_count: None,
            metadata: None,
        }
    }

    pub fn user(session_id: SessionKey, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(session_id, Role::User)
        }
    }

    pub fn system(session_id: SessionKey, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(session_id, Role::System)
        }
    }

    pub fn assistant_text(session_id: SessionKey, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(session_id, Role::Assistant)
        }
    }

    pub fn assistant_tool_calls(
        session_id: SessionKey,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            content,
            tool_calls: Some(tool_calls),
            ..Self::new(session_id, Role::Assistant)
        }
    }

    pub fn tool_result(
        session_id: SessionKey,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            content: Some(content.into()),
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(session_id, Role::Tool)
        }
    }

    pub fn mark_truncated(mut self) -> Self {
        let mut meta = self.metadata.take().unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = meta.as_object_mut() {
            obj.insert("truncated".to_string(), serde_json::Value::Bool(true));
        }
        self.metadata = Some(meta);
        self
    }
}

/// Tool definition sent to the LLM.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A session: an ordered conversation between one user and the runtime
/// (spec §3 "Session"). Owns its Messages; the log itself lives in the
/// message repository, not inline here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionKey,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: SessionKey, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            created_at: now,
            last_activity_at: now,
            is_active: true,
            deleted_at: None,
        }
    }
}

/// One recorded agent switch (spec §3 "AgentContext").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSwitch {
    pub from: AgentType,
    pub to: AgentType,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Tracks the currently-active agent for a session (spec §3 "AgentContext").
///
/// Invariant: `history.len() == switch_count`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentContext {
    pub session_id: SessionKey,
    pub current_agent: AgentType,
    pub history: Vec<AgentSwitch>,
    pub switch_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_switch_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl AgentContext {
    pub fn new(session_id: SessionKey, initial_agent: AgentType) -> Self {
        Self {
            session_id,
            current_agent: initial_agent,
            history: Vec::new(),
            switch_count: 0,
            created_at: Utc::now(),
            last_switch_at: None,
            metadata: serde_json::json!({}),
        }
    }

    /// Record a switch; caller is responsible for persisting the result.
    pub fn apply_switch(&mut self, to: AgentType, reason: impl Into<String>) -> AgentSwitch {
        let now = Utc::now();
        let entry = AgentSwitch {
            from: self.current_agent,
            to,
            reason: reason.into(),
            at: now,
        };
        self.history.push(entry.clone());
        self.switch_count = self.history.len() as u32;
        self.current_agent = to;
        self.last_switch_at = Some(now);
        entry
    }
}

/// Human decision on a pending tool-call approval (spec §6.1 "hitl_decision").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HitlDecision {
    Approve,
    Reject,
    Edit,
}

/// Lifecycle status of a pending approval (spec §3 "PendingApproval").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Edited,
}

/// A side-effecting tool call awaiting human approval (spec §3 "PendingApproval").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingApproval {
    pub call_id: String,
    pub session_id: SessionKey,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    pub decision_feedback: Option<String>,
    pub modified_arguments: Option<serde_json::Value>,
}

/// A page of results, used by `list_sessions` (spec §4.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

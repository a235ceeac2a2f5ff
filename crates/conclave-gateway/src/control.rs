//! Control endpoints (spec §6.2): session CRUD, agent inspection/switching,
//! and the event-metrics views, all scoped to the authenticated caller.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use conclave_core::{Message, Page, PendingApproval, Session, SessionKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::router::GatewayState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn create_session(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Session>> {
    let session = state.sessions.create_session(&user.user_id).await?;
    Ok(Json(session))
}

#[derive(Deserialize)]
pub struct GetSessionQuery {
    #[serde(default)]
    include_messages: bool,
}

#[derive(Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<Message>>,
    /// Restored on every fetch, not gated behind `include_messages` — a
    /// resuming client needs to know what's awaiting its decision before it
    /// decides whether to also pull the full history (spec §3 "Pending
    /// approvals are restored to the client on session resume").
    pending_approvals: Vec<PendingApproval>,
}

pub async fn get_session(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
    Query(query): Query<GetSessionQuery>,
) -> ApiResult<Json<SessionDetail>> {
    let key = SessionKey::new(session_id);
    let session = state.sessions.get_session(&key).await?;
    if session.user_id != user.user_id {
        return Err(ApiError(conclave_core::Error::SessionNotFound(key.as_str().to_string())));
    }

    let messages = if query.include_messages {
        Some(state.sessions.get_history(&key).await?)
    } else {
        None
    };
    let pending_approvals = state.hitl.list_pending(&key).await?;

    Ok(Json(SessionDetail {
        session,
        messages,
        pending_approvals,
    }))
}

#[derive(Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_size")]
    size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    20
}

pub async fn list_sessions(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Page<Session>>> {
    let page = state
        .sessions
        .list_sessions(&user.user_id, false, query.page, query.size)
        .await?;
    Ok(Json(page))
}

#[derive(Serialize)]
pub struct AgentSummary {
    agent_type: String,
    system_prompt: String,
    allowed_tools: Vec<String>,
}

pub async fn list_agents(State(state): State<GatewayState>) -> Json<Vec<AgentSummary>> {
    let all = [
        conclave_core::AgentType::Orchestrator,
        conclave_core::AgentType::Coder,
        conclave_core::AgentType::Architect,
        conclave_core::AgentType::Debug,
        conclave_core::AgentType::Ask,
        conclave_core::AgentType::Universal,
    ];
    let summaries = all
        .into_iter()
        .filter(|agent_type| state.registry.is_member(*agent_type))
        .map(|agent_type| {
            let def = state.registry.get(agent_type);
            AgentSummary {
                agent_type: agent_type.as_str().to_string(),
                system_prompt: def.system_prompt.clone(),
                allowed_tools: def.tool_definitions().into_iter().map(|t| t.name).collect(),
            }
        })
        .collect();
    Json(summaries)
}

#[derive(Serialize)]
pub struct CurrentAgentResponse {
    agent_type: String,
}

pub async fn current_agent(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CurrentAgentResponse>> {
    let key = SessionKey::new(session_id);
    let initial = if state.registry.mode() == conclave_agent::RegistryMode::SingleAgent {
        state.registry.single_agent_target()
    } else {
        state.registry.initial_agent()
    };
    let agent_type = state.contexts.current_agent(&key, initial).await?;
    Ok(Json(CurrentAgentResponse {
        agent_type: agent_type.as_str().to_string(),
    }))
}

#[derive(Deserialize)]
pub struct SwitchAgentBody {
    agent_type: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Directly re-points the active agent without going through the orchestrator
/// turn loop — distinct from the `switch_agent` wire message, which may also
/// feed in `initial_content` and continue the turn (spec §6.1 vs. §6.2).
pub async fn switch_agent(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Json(body): Json<SwitchAgentBody>,
) -> ApiResult<Json<Value>> {
    let key = SessionKey::new(session_id);
    let target = conclave_core::AgentType::parse(&body.agent_type)
        .ok_or_else(|| ApiError(conclave_core::Error::validation(format!("unknown agent_type '{}'", body.agent_type))))?;

    let initial = if state.registry.mode() == conclave_agent::RegistryMode::SingleAgent {
        state.registry.single_agent_target()
    } else {
        state.registry.initial_agent()
    };
    let reason = body.reason.unwrap_or_else(|| "manual switch via control endpoint".to_string());
    let ctx = state.contexts.switch(&key, initial, target, reason).await?;
    Ok(Json(json!({
        "current_agent": ctx.current_agent.as_str(),
        "switch_count": ctx.switch_count,
    })))
}

pub async fn metrics(State(state): State<GatewayState>) -> Json<Value> {
    let snapshot = state.metrics.snapshot();
    let counts: serde_json::Map<String, Value> = snapshot
        .into_iter()
        .map(|(event_type, count)| (format!("{event_type:?}").to_lowercase(), json!(count)))
        .collect();
    Json(Value::Object(counts))
}

pub async fn session_metrics(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    let key = SessionKey::new(session_id);
    match state.session_metrics.usage_for(&key) {
        Some((started, completed, failed)) => Json(json!({
            "requests_started": started,
            "requests_completed": completed,
            "requests_failed": failed,
        })),
        None => Json(json!({
            "requests_started": 0,
            "requests_completed": 0,
            "requests_failed": 0,
        })),
    }
}

/// Satisfies the "accept a decision out-of-band from the SSE stream" need for
/// clients that poll rather than hold a stream open across an approval wait.
pub async fn hitl_decision_preview(
    State(state): State<GatewayState>,
    Path(call_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let approval = state.hitl.get(&call_id).await?;
    Ok(Json(json!({
        "call_id": approval.call_id,
        "tool_name": approval.tool_name,
        "arguments": approval.arguments,
        "status": format!("{:?}", approval.status).to_lowercase(),
    })))
}

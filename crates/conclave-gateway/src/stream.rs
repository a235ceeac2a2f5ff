//! The `POST /api/v1/messages/stream` SSE handler (spec §6.1): parses the
//! wire request, dispatches into the orchestrator, and turns the resulting
//! [`ChunkStream`] into an `text/event-stream` response.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use conclave_core::{AgentType, Chunk, IncomingMessage, SessionKey, StreamRequest};
use futures::stream::{self, Stream, StreamExt};

use crate::auth::AuthenticatedUser;
use crate::router::GatewayState;

fn chunk_event_name(chunk: &Chunk) -> &'static str {
    match chunk {
        Chunk::SessionInfo { .. } => "session_info",
        Chunk::AssistantMessage { .. } => "assistant_message",
        Chunk::ToolCall { .. } => "tool_call",
        Chunk::HitlRequest { .. } => "hitl_request",
        Chunk::SwitchAgent { .. } => "switch_agent",
        Chunk::Error { .. } => "error",
        Chunk::Done => "done",
    }
}

fn to_sse_event(chunk: Chunk) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string());
    Ok(Event::default().event(chunk_event_name(&chunk)).data(data))
}

/// A single SSE `error` event, used for pre-flight validation failures that
/// never reach the orchestrator (malformed session id, unparseable agent).
fn single_error_stream(kind: &'static str, detail: String) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::once(async move { to_sse_event(Chunk::error(kind, detail, true)) })
}

pub async fn messages_stream(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<StreamRequest>,
) -> Response {
    let session_id = SessionKey::new(req.session_id);

    let chunks: std::pin::Pin<Box<dyn Stream<Item = Chunk> + Send>> = match req.message {
        IncomingMessage::UserMessage { content, agent_type } => {
            let agent_type = match agent_type {
                Some(raw) => match AgentType::parse(&raw) {
                    Some(a) => Some(a),
                    None => {
                        return Sse::new(single_error_stream("validation_error", format!("unknown agent_type '{raw}'")))
                            .keep_alive(KeepAlive::default())
                            .into_response();
                    }
                },
                None => None,
            };
            let session_arg = if session_id.is_placeholder() { None } else { Some(session_id) };
            state
                .orchestrator
                .process_message(session_arg, user.user_id, content, agent_type)
        }
        IncomingMessage::ToolResult { call_id, tool_name, result } => state.orchestrator.process_tool_result(
            session_id,
            call_id,
            tool_name,
            result.into_content_string(),
        ),
        IncomingMessage::HitlDecision {
            call_id,
            decision,
            feedback,
            modified_arguments,
        } => state
            .orchestrator
            .process_hitl_decision(session_id, call_id, decision, feedback, modified_arguments),
        IncomingMessage::SwitchAgent { agent_type, content } => match AgentType::parse(&agent_type) {
            Some(target) => state.orchestrator.process_switch_agent(session_id, target, content),
            None => {
                return Sse::new(single_error_stream(
                    "validation_error",
                    format!("unknown agent_type '{agent_type}'"),
                ))
                .keep_alive(KeepAlive::default())
                .into_response();
            }
        },
    };

    let sse_stream = chunks.map(|chunk| to_sse_event(chunk));
    Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response()
}

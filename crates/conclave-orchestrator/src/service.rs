//! The Orchestration Service (spec §4.7): the four public entry points and
//! the agent-turn loop that drives them. Every entry point acquires the
//! session lock, does its work, and releases the lock when its stream is
//! exhausted or the receiver drops (client disconnect).

use conclave_agent::{catalog, check_tool_call, AgentDefinition, AgentRegistry, RegistryMode};
use conclave_core::{AgentType, Chunk, Error, FinishReason, HitlDecision, Message, SessionKey, ToolCall};
use conclave_events::{Event, EventBus, EventPayload};
use conclave_hitl::{requires_approval, HitlService};
use conclave_llm::{AccumulatedToolCall, ChatRequest, LlmClient, StreamDelta};
use conclave_session::{AgentContextService, SessionLockManager, SessionService};
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One logical frame yielded to a client, as an owned stream.
pub type ChunkStream = Pin<Box<dyn futures::Stream<Item = Chunk> + Send>>;

const CHUNK_BUFFER: usize = 32;

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Whether a just-completed agent turn should immediately start another turn
/// or hand control back to the caller (the client, or a re-entry endpoint).
enum LoopOutcome {
    Continue,
    Exit,
}

pub struct Orchestrator {
    sessions: Arc<SessionService>,
    contexts: Arc<AgentContextService>,
    hitl: Arc<HitlService>,
    locks: Arc<SessionLockManager>,
    registry: Arc<AgentRegistry>,
    llm: Arc<dyn LlmClient>,
    events: Arc<EventBus>,
    model: String,
    history_limit: u32,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionService>,
        contexts: Arc<AgentContextService>,
        hitl: Arc<HitlService>,
        locks: Arc<SessionLockManager>,
        registry: Arc<AgentRegistry>,
        llm: Arc<dyn LlmClient>,
        events: Arc<EventBus>,
        model: impl Into<String>,
        history_limit: u32,
    ) -> Self {
        Self {
            sessions,
            contexts,
            hitl,
            locks,
            registry,
            llm,
            events,
            model: model.into(),
            history_limit,
        }
    }

    /// `process_message(session_id, content, agent_type?)` (spec §4.7).
    /// `session_id = None` or a `new_`-prefixed id mints a fresh session.
    pub fn process_message(
        self: &Arc<Self>,
        session_id: Option<SessionKey>,
        user_id: String,
        content: String,
        agent_type: Option<AgentType>,
    ) -> ChunkStream {
        let this = self.clone();
        spawn_stream(move |tx| this.run_process_message(session_id, user_id, content, agent_type, tx))
    }

    pub fn process_tool_result(
        self: &Arc<Self>,
        session_id: SessionKey,
        call_id: String,
        tool_name: String,
        result: String,
    ) -> ChunkStream {
        let this = self.clone();
        spawn_stream(move |tx| this.run_process_tool_result(session_id, call_id, tool_name, result, tx))
    }

    pub fn process_hitl_decision(
        self: &Arc<Self>,
        session_id: SessionKey,
        call_id: String,
        decision: HitlDecision,
        feedback: Option<String>,
        modified_arguments: Option<serde_json::Value>,
    ) -> ChunkStream {
        let this = self.clone();
        spawn_stream(move |tx| {
            this.run_process_hitl_decision(session_id, call_id, decision, feedback, modified_arguments, tx)
        })
    }

    pub fn process_switch_agent(
        self: &Arc<Self>,
        session_id: SessionKey,
        target_agent: AgentType,
        initial_content: Option<String>,
    ) -> ChunkStream {
        let this = self.clone();
        spawn_stream(move |tx| this.run_process_switch_agent(session_id, target_agent, initial_content, tx))
    }

    async fn run_process_message(
        self: Arc<Self>,
        session_id: Option<SessionKey>,
        user_id: String,
        content: String,
        agent_type: Option<AgentType>,
        tx: mpsc::Sender<Chunk>,
    ) {
        // A brand-new id has no concurrent holders yet, so session creation
        // (if needed) happens before the lock is acquired (spec §4.7 step 1).
        let is_new = session_id.as_ref().map(|s| s.is_placeholder()).unwrap_or(true);
        let session = match self.sessions.resolve_session(session_id.as_ref(), &user_id).await {
            Ok(s) => s,
            Err(e) => return self.yield_error(&tx, &e).await,
        };

        let _guard = self.locks.lock(&session.id).await;

        if is_new && tx.send(Chunk::SessionInfo { session_id: session.id.clone() }).await.is_err() {
            return;
        }

        if let Some(requested) = agent_type {
            let current = match self
                .contexts
                .current_agent(&session.id, self.registry.initial_agent())
                .await
            {
                Ok(a) => a,
                Err(e) => return self.yield_error(&tx, &e).await,
            };
            if requested != current {
                if let Err(e) = self
                    .contexts
                    .switch(&session.id, self.registry.initial_agent(), requested, "client-specified agent_type")
                    .await
                {
                    return self.yield_error(&tx, &e).await;
                }
                let sent = tx
                    .send(Chunk::SwitchAgent {
                        from_agent: current,
                        to_agent: requested,
                        reason: "client-specified agent_type".to_string(),
                    })
                    .await;
                if sent.is_err() {
                    return;
                }
            }
        }

        if let Err(e) = self.sessions.append_user_message(&session.id, &content).await {
            return self.yield_error(&tx, &e).await;
        }

        self.turn_loop(&session.id, &tx).await;
    }

    async fn run_process_tool_result(
        self: Arc<Self>,
        session_id: SessionKey,
        call_id: String,
        tool_name: String,
        result: String,
        tx: mpsc::Sender<Chunk>,
    ) {
        let _guard = self.locks.lock(&session_id).await;

        if let Err(e) = self
            .sessions
            .append_tool_result(&session_id, &call_id, &tool_name, &result)
            .await
        {
            return self.yield_error(&tx, &e).await;
        }

        self.events.publish(Event::new(
            EventPayload::ToolResultReceived { call_id, tool_name, is_error: false },
            Some(session_id.clone()),
        ));

        self.turn_loop(&session_id, &tx).await;
    }

    async fn run_process_hitl_decision(
        self: Arc<Self>,
        session_id: SessionKey,
        call_id: String,
        decision: HitlDecision,
        feedback: Option<String>,
        modified_arguments: Option<serde_json::Value>,
        tx: mpsc::Sender<Chunk>,
    ) {
        let _guard = self.locks.lock(&session_id).await;

        let resolved = match self
            .hitl
            .resolve(&call_id, decision, feedback.clone(), modified_arguments.clone())
            .await
        {
            Ok(r) => r,
            Err(e) => return self.yield_error(&tx, &e).await,
        };

        match decision {
            HitlDecision::Approve | HitlDecision::Edit => {
                let arguments = resolved.modified_arguments.unwrap_or(resolved.arguments);
                let _ = tx
                    .send(Chunk::ToolCall {
                        call_id,
                        tool_name: resolved.tool_name,
                        arguments,
                    })
                    .await;
                // The IDE will eventually call process_tool_result; exit here.
            }
            HitlDecision::Reject => {
                let reason = feedback.unwrap_or_else(|| "no reason given".to_string());
                let content = format!("Rejected by user: {reason}");
                if let Err(e) = self
                    .sessions
                    .append_tool_result(&session_id, &call_id, &resolved.tool_name, &content)
                    .await
                {
                    return self.yield_error(&tx, &e).await;
                }
                self.turn_loop(&session_id, &tx).await;
            }
        }
    }

    async fn run_process_switch_agent(
        self: Arc<Self>,
        session_id: SessionKey,
        target_agent: AgentType,
        initial_content: Option<String>,
        tx: mpsc::Sender<Chunk>,
    ) {
        let _guard = self.locks.lock(&session_id).await;

        let current = match self
            .contexts
            .current_agent(&session_id, self.registry.initial_agent())
            .await
        {
            Ok(a) => a,
            Err(e) => return self.yield_error(&tx, &e).await,
        };

        if !self.registry.is_member(target_agent) {
            let err = Error::Validation(format!(
                "agent {target_agent} is not available in this deployment mode"
            ));
            return self.yield_error(&tx, &err).await;
        }

        let reason = "explicit switch_agent request";
        if let Err(e) = self
            .contexts
            .switch(&session_id, self.registry.initial_agent(), target_agent, reason)
            .await
        {
            return self.yield_error(&tx, &e).await;
        }

        let sent = tx
            .send(Chunk::SwitchAgent {
                from_agent: current,
                to_agent: target_agent,
                reason: reason.to_string(),
            })
            .await;
        if sent.is_err() {
            return;
        }

        match initial_content {
            Some(content) => {
                if let Err(e) = self.sessions.append_user_message(&session_id, &content).await {
                    return self.yield_error(&tx, &e).await;
                }
                self.turn_loop(&session_id, &tx).await;
            }
            None => {
                let _ = tx.send(Chunk::Done).await;
            }
        }
    }

    /// The agent turn loop (spec §4.7 "Message-handling algorithm" step 4).
    /// Runs until a step yields a terminal chunk (`Done`, `ToolCall`,
    /// `HitlRequest`, or a final `Error`), or the Orchestrator's routing
    /// shortcut re-enters it with a new agent.
    async fn turn_loop(&self, session_id: &SessionKey, tx: &mpsc::Sender<Chunk>) {
        loop {
            let agent_type = match self
                .contexts
                .current_agent(session_id, self.registry.initial_agent())
                .await
            {
                Ok(a) => a,
                Err(e) => return self.yield_error(tx, &e).await,
            };

            // Single-agent mode: the Orchestrator never calls the LLM, it
            // routes straight to Universal (spec §4.9, §4.7 "Orchestrator routing").
            if agent_type == AgentType::Orchestrator && self.registry.mode() == RegistryMode::SingleAgent {
                let target = self.registry.single_agent_target();
                let reason = "single-agent mode routing";
                if let Err(e) = self.contexts.switch(session_id, agent_type, target, reason).await {
                    return self.yield_error(tx, &e).await;
                }
                if tx
                    .send(Chunk::SwitchAgent {
                        from_agent: agent_type,
                        to_agent: target,
                        reason: reason.to_string(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }

            let agent_def = self.registry.get(agent_type);

            let history = match self.sessions.recent_history(session_id, self.history_limit).await {
                Ok(h) => h,
                Err(e) => return self.yield_error(tx, &e).await,
            };

            let request = ChatRequest::new(self.model.clone(), history)
                .with_tools(agent_def.tool_definitions())
                .with_system(agent_def.system_prompt.clone());

            self.events.publish(Event::new(
                EventPayload::LlmRequestStarted { model: self.model.clone() },
                Some(session_id.clone()),
            ));
            let started_at = Instant::now();

            let stream = match self.llm.complete_stream(request, None).await {
                Ok(s) => s,
                Err(e) => {
                    self.events.publish(Event::new(
                        EventPayload::LlmRequestFailed {
                            model: self.model.clone(),
                            error_kind: e.to_string(),
                        },
                        Some(session_id.clone()),
                    ));
                    let err = Error::Llm(e.into());
                    return self.yield_error(tx, &err).await;
                }
            };

            match self
                .consume_llm_stream(session_id, agent_type, agent_def, stream, started_at, tx)
                .await
            {
                LoopOutcome::Continue => continue,
                LoopOutcome::Exit => return,
            }
        }
    }

    /// Drains one LLM stream: forwards text as it arrives (one token behind,
    /// so the last chunk can carry `is_final=true` without an extra empty
    /// frame) and reassembles tool_calls by id until `Done` arrives.
    #[allow(clippy::too_many_arguments)]
    async fn consume_llm_stream(
        &self,
        session_id: &SessionKey,
        agent_type: AgentType,
        agent_def: &AgentDefinition,
        mut stream: conclave_llm::ChatStream,
        started_at: Instant,
        tx: &mpsc::Sender<Chunk>,
    ) -> LoopOutcome {
        let mut full_text = String::new();
        let mut pending: Option<String> = None;
        let mut calls: Vec<AccumulatedToolCall> = Vec::new();

        loop {
            let item = match stream.next().await {
                Some(item) => item,
                None => {
                    let err = Error::Llm(conclave_core::LlmErrorKind::Permanent(
                        "llm stream ended without a finish reason".to_string(),
                    ));
                    self.publish_llm_failed(session_id, &err);
                    self.yield_error(tx, &err).await;
                    return LoopOutcome::Exit;
                }
            };

            match item {
                Ok(StreamDelta::Text(token)) => {
                    full_text.push_str(&token);
                    if let Some(prev) = pending.take() {
                        if tx.send(Chunk::AssistantMessage { token: prev, is_final: false }).await.is_err() {
                            return LoopOutcome::Exit;
                        }
                    }
                    pending = Some(token);
                }
                Ok(StreamDelta::ToolCallStart { id, name }) => {
                    calls.push(AccumulatedToolCall { id, name, arguments: String::new() });
                }
                Ok(StreamDelta::ToolCallDelta { id, arguments }) => {
                    if let Some(call) = calls.iter_mut().find(|c| c.id == id) {
                        call.arguments.push_str(&arguments);
                    }
                }
                Ok(StreamDelta::ToolCallEnd { .. }) => {}
                Ok(StreamDelta::Done { finish_reason, .. }) => {
                    self.events.publish(Event::new(
                        EventPayload::LlmRequestCompleted {
                            model: self.model.clone(),
                            duration_ms: started_at.elapsed().as_millis() as u64,
                            finish_reason: format!("{finish_reason:?}").to_lowercase(),
                        },
                        Some(session_id.clone()),
                    ));
                    return self
                        .on_done(session_id, agent_type, agent_def, finish_reason, full_text, pending, calls, tx)
                        .await;
                }
                Err(e) => {
                    let err = Error::Llm(e.into());
                    self.publish_llm_failed(session_id, &err);
                    self.yield_error(tx, &err).await;
                    return LoopOutcome::Exit;
                }
            }
        }
    }

    fn publish_llm_failed(&self, session_id: &SessionKey, err: &Error) {
        self.events.publish(Event::new(
            EventPayload::LlmRequestFailed {
                model: self.model.clone(),
                error_kind: err.kind().to_string(),
            },
            Some(session_id.clone()),
        ));
    }

    /// Reacts to the LLM's `Done(finish_reason)` (spec §4.7 step 4c).
    #[allow(clippy::too_many_arguments)]
    async fn on_done(
        &self,
        session_id: &SessionKey,
        agent_type: AgentType,
        agent_def: &AgentDefinition,
        finish_reason: FinishReason,
        full_text: String,
        pending: Option<String>,
        calls: Vec<AccumulatedToolCall>,
        tx: &mpsc::Sender<Chunk>,
    ) -> LoopOutcome {
        match finish_reason {
            FinishReason::Stop => {
                let final_token = pending.unwrap_or_default();
                if tx.send(Chunk::AssistantMessage { token: final_token, is_final: true }).await.is_err() {
                    return LoopOutcome::Exit;
                }
                if let Err(e) = self.sessions.append_assistant_text(session_id, &full_text).await {
                    self.yield_error(tx, &e).await;
                    return LoopOutcome::Exit;
                }
                let _ = tx.send(Chunk::Done).await;
                LoopOutcome::Exit
            }
            FinishReason::Length => {
                let final_token = pending.unwrap_or_default();
                if tx.send(Chunk::AssistantMessage { token: final_token, is_final: true }).await.is_err() {
                    return LoopOutcome::Exit;
                }
                let message = Message::assistant_text(session_id.clone(), full_text).mark_truncated();
                if let Err(e) = self.sessions.add_message(message).await {
                    self.yield_error(tx, &e).await;
                    return LoopOutcome::Exit;
                }
                let _ = tx.send(Chunk::Done).await;
                LoopOutcome::Exit
            }
            FinishReason::Error => {
                let err = Error::Llm(conclave_core::LlmErrorKind::Permanent(
                    "llm reported an error finish reason".to_string(),
                ));
                self.yield_error(tx, &err).await;
                LoopOutcome::Exit
            }
            FinishReason::ToolCalls => {
                self.handle_tool_calls(session_id, agent_type, agent_def, full_text, calls, tx)
                    .await
            }
        }
    }

    /// Processes the reassembled tool_calls in emission order (spec §4.7 step
    /// 4c "Done(tool_calls)"). Each call gets its own assistant message — one
    /// tool_call per message — which keeps the tool_call/tool_result pairing
    /// invariant trivial to check and matches every scenario in the spec,
    /// which exercises exactly one tool_call per turn.
    async fn handle_tool_calls(
        &self,
        session_id: &SessionKey,
        agent_type: AgentType,
        agent_def: &AgentDefinition,
        full_text: String,
        calls: Vec<AccumulatedToolCall>,
        tx: &mpsc::Sender<Chunk>,
    ) -> LoopOutcome {
        if calls.is_empty() {
            let err = Error::Llm(conclave_core::LlmErrorKind::Permanent(
                "tool_calls finish reason carried no tool calls".to_string(),
            ));
            self.yield_error(tx, &err).await;
            return LoopOutcome::Exit;
        }

        let content = non_empty(&full_text);
        let last_index = calls.len() - 1;

        for (idx, call) in calls.into_iter().enumerate() {
            let arguments = match call.parse_arguments() {
                Ok(v) => v,
                Err(e) => {
                    let detail = format!("malformed tool_call arguments: {e}");
                    if let Err(e) = self
                        .sessions
                        .append_tool_result(session_id, &call.id, &call.name, &detail)
                        .await
                    {
                        self.yield_error(tx, &e).await;
                        return LoopOutcome::Exit;
                    }
                    if idx == last_index {
                        return LoopOutcome::Continue;
                    }
                    continue;
                }
            };

            if call.name == catalog::SWITCH_MODE {
                return self
                    .handle_switch_mode(session_id, agent_type, content, call, arguments, tx)
                    .await;
            }

            let tool_call = ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: arguments.clone(),
            };
            if let Err(e) = self
                .sessions
                .append_assistant_tool_calls(session_id, content.clone(), vec![tool_call])
                .await
            {
                self.yield_error(tx, &e).await;
                return LoopOutcome::Exit;
            }

            if let Err(gate_err) = check_tool_call(agent_def, &call.name, &arguments) {
                if let Err(e) = self
                    .sessions
                    .append_tool_result(session_id, &call.id, &call.name, &gate_err.as_tool_result_content())
                    .await
                {
                    self.yield_error(tx, &e).await;
                    return LoopOutcome::Exit;
                }
                if idx == last_index {
                    return LoopOutcome::Continue;
                }
                continue;
            }

            self.events.publish(Event::new(
                EventPayload::ToolCallEmitted { call_id: call.id.clone(), tool_name: call.name.clone() },
                Some(session_id.clone()),
            ));

            if requires_approval(&call.name) {
                if let Err(e) = self.hitl.create_pending(session_id, &call.id, &call.name, arguments.clone()).await
                {
                    self.yield_error(tx, &e).await;
                    return LoopOutcome::Exit;
                }
                let _ = tx
                    .send(Chunk::HitlRequest { call_id: call.id, tool_name: call.name, arguments })
                    .await;
                return LoopOutcome::Exit;
            }

            let _ = tx.send(Chunk::ToolCall { call_id: call.id, tool_name: call.name, arguments }).await;
            return LoopOutcome::Exit;
        }

        // Every call in the batch was a gate failure or malformed; the loop
        // continues so the model can see those errors and try again.
        LoopOutcome::Continue
    }

    /// `switch_mode` is the one tool that is never paired with a tool-role
    /// result (spec §9 "exception as control flow", §4.7 step 4c).
    async fn handle_switch_mode(
        &self,
        session_id: &SessionKey,
        agent_type: AgentType,
        content: Option<String>,
        call: AccumulatedToolCall,
        arguments: serde_json::Value,
        tx: &mpsc::Sender<Chunk>,
    ) -> LoopOutcome {
        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: arguments.clone(),
        };
        if let Err(e) = self
            .sessions
            .append_assistant_tool_calls(session_id, content, vec![tool_call])
            .await
        {
            self.yield_error(tx, &e).await;
            return LoopOutcome::Exit;
        }

        let target_name = arguments.get("mode").and_then(|v| v.as_str()).unwrap_or("");
        let reason = arguments
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("no reason given")
            .to_string();

        let Some(target) = AgentType::parse(target_name) else {
            let err = Error::Validation(format!("switch_mode requested an unknown agent: {target_name}"));
            self.yield_error(tx, &err).await;
            return LoopOutcome::Exit;
        };

        if !self.registry.is_member(target) {
            let err = Error::Validation(format!("agent {target} is not available in this deployment mode"));
            self.yield_error(tx, &err).await;
            return LoopOutcome::Exit;
        }

        if let Err(e) = self.contexts.switch(session_id, agent_type, target, reason.clone()).await {
            self.yield_error(tx, &e).await;
            return LoopOutcome::Exit;
        }

        if tx
            .send(Chunk::SwitchAgent { from_agent: agent_type, to_agent: target, reason })
            .await
            .is_err()
        {
            return LoopOutcome::Exit;
        }

        // Orchestrator-initiated routing re-enters the loop immediately with
        // the new agent and the same history (spec §4.7 "Orchestrator
        // routing" — explicit, not the open question); any other agent's
        // switch_mode waits for the next user input (the documented default
        // of the open "implementer's choice", recorded in DESIGN.md).
        if agent_type == AgentType::Orchestrator {
            LoopOutcome::Continue
        } else {
            LoopOutcome::Exit
        }
    }

    async fn yield_error(&self, tx: &mpsc::Sender<Chunk>, err: &Error) {
        let _ = tx.send(Chunk::error(err.kind(), err.to_string(), true)).await;
    }
}

fn spawn_stream<F, Fut>(run: F) -> ChunkStream
where
    F: FnOnce(mpsc::Sender<Chunk>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
    tokio::spawn(run(tx));
    Box::pin(ReceiverStream::new(rx))
}

/// Convenience surfaced at the gateway boundary for a request referencing an
/// unknown session.
pub fn session_not_found(session_id: &SessionKey) -> Error {
    Error::SessionNotFound(session_id.as_str().to_string())
}

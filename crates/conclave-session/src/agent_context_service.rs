//! Agent Context Service (spec §4.3): tracks the currently-active agent for
//! a session and the history of switches between agents.

use conclave_core::{AgentContext, AgentType, Result, SessionKey};
use conclave_events::{Event, EventBus, EventPayload};
use conclave_storage::AgentContextRepository;
use std::sync::Arc;

pub struct AgentContextService {
    contexts: AgentContextRepository,
    events: Arc<EventBus>,
}

impl AgentContextService {
    pub fn new(contexts: AgentContextRepository, events: Arc<EventBus>) -> Self {
        Self { contexts, events }
    }

    /// Fetch the context for a session, creating one pinned to `initial_agent`
    /// if this is the session's first turn.
    pub async fn get_or_create(&self, session_id: &SessionKey, initial_agent: AgentType) -> Result<AgentContext> {
        self.contexts.get_or_create(session_id, initial_agent).await
    }

    pub async fn current_agent(&self, session_id: &SessionKey, initial_agent: AgentType) -> Result<AgentType> {
        Ok(self.get_or_create(session_id, initial_agent).await?.current_agent)
    }

    /// Switch the active agent, append to history, persist, and publish
    /// `AgentSwitched`. Invariant: `history.len() == switch_count` always
    /// holds after this call (spec §3 "AgentContext").
    pub async fn switch(
        &self,
        session_id: &SessionKey,
        initial_agent: AgentType,
        to: AgentType,
        reason: impl Into<String>,
    ) -> Result<AgentContext> {
        let mut ctx = self.get_or_create(session_id, initial_agent).await?;
        let reason = reason.into();
        let switch = ctx.apply_switch(to, reason.clone());
        self.contexts.save(&ctx).await?;

        self.events.publish(Event::new(
            EventPayload::AgentSwitched {
                from: switch.from,
                to: switch.to,
                reason,
            },
            Some(session_id.clone()),
        ));

        Ok(ctx)
    }
}

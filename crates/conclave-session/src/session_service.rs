//! Session Service (spec §4.2): session lifecycle and the append-only
//! message log.

use chrono::Utc;
use conclave_core::{Error, Message, Page, Result, Role, Session, SessionKey, ToolCall};
use conclave_events::{Event, EventBus, EventPayload};
use conclave_storage::{MessageRepository, SessionRepository};
use std::sync::Arc;

pub struct SessionService {
    sessions: SessionRepository,
    messages: MessageRepository,
    events: Arc<EventBus>,
}

impl SessionService {
    pub fn new(sessions: SessionRepository, messages: MessageRepository, events: Arc<EventBus>) -> Self {
        Self {
            sessions,
            messages,
            events,
        }
    }

    /// Create a new session for `user_id` and publish `SessionCreated`.
    pub async fn create_session(&self, user_id: &str) -> Result<Session> {
        self.create_session_with_id(None, user_id).await
    }

    /// Create a session, optionally pinning its id. Idempotent: if `id`
    /// already names an active session, that session is returned and no
    /// event is published a second time (spec §4.2 `create_session`, §8
    /// "Idempotence" law: same id never duplicates events).
    pub async fn create_session_with_id(
        &self,
        id: Option<SessionKey>,
        user_id: &str,
    ) -> Result<Session> {
        let existing = match &id {
            Some(id) => self.sessions.get(id).await.ok(),
            None => None,
        };
        if let Some(session) = existing {
            return Ok(session);
        }

        let session = self.sessions.create_with_id(id.as_ref(), user_id).await?;

        self.events.publish(Event::new(
            EventPayload::SessionCreated {
                user_id: user_id.to_string(),
            },
            Some(session.id.clone()),
        ));

        Ok(session)
    }

    /// Resolve a client-supplied `session_id`: a `new_`-prefixed placeholder
    /// (or no id at all) mints a fresh session; anything else must already
    /// exist (spec §6.1).
    pub async fn resolve_session(
        &self,
        session_id: Option<&SessionKey>,
        user_id: &str,
    ) -> Result<Session> {
        match session_id {
            Some(id) if !id.is_placeholder() => self.sessions.get(id).await,
            _ => self.create_session(user_id).await,
        }
    }

    pub async fn get_session(&self, id: &SessionKey) -> Result<Session> {
        self.sessions.get(id).await
    }

    /// Lists a user's non-deleted sessions by default; `include_deleted` is
    /// surfaced for admin/audit views (spec §4.2, §3 "Session" `deleted_at`).
    pub async fn list_sessions(
        &self,
        user_id: &str,
        include_deleted: bool,
        page: u32,
        size: u32,
    ) -> Result<Page<Session>> {
        self.sessions.list(user_id, include_deleted, page, size).await
    }

    /// Append a message and bump `last_activity_at` to the message's own
    /// timestamp, atomically in one transaction, then publish
    /// `MessageAppended` (spec §4.2, §8 invariant 3).
    pub async fn add_message(&self, message: Message) -> Result<Message> {
        self.messages.append_bumping_session(&message).await?;

        self.events.publish(Event::new(
            EventPayload::MessageAppended {
                message_id: message.id.clone(),
                role: format!("{:?}", message.role).to_lowercase(),
            },
            Some(message.session_id.clone()),
        ));

        Ok(message)
    }

    pub async fn append_user_message(&self, session_id: &SessionKey, content: &str) -> Result<Message> {
        self.add_message(Message::user(session_id.clone(), content)).await
    }

    pub async fn append_assistant_text(&self, session_id: &SessionKey, content: &str) -> Result<Message> {
        self.add_message(Message::assistant_text(session_id.clone(), content))
            .await
    }

    pub async fn append_assistant_tool_calls(
        &self,
        session_id: &SessionKey,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Result<Message> {
        self.add_message(Message::assistant_tool_calls(session_id.clone(), content, tool_calls))
            .await
    }

    pub async fn append_tool_result(
        &self,
        session_id: &SessionKey,
        tool_call_id: &str,
        tool_name: &str,
        content: &str,
    ) -> Result<Message> {
        self.add_message(Message::tool_result(session_id.clone(), tool_call_id, tool_name, content))
            .await
    }

    pub async fn get_history(&self, session_id: &SessionKey) -> Result<Vec<Message>> {
        self.messages.history(session_id).await
    }

    /// Most recent `limit` messages, oldest first — bounds what gets sent to
    /// the LLM Driver without requiring full-history paging (spec §4.5).
    pub async fn recent_history(&self, session_id: &SessionKey, limit: u32) -> Result<Vec<Message>> {
        self.messages.recent(session_id, limit).await
    }

    /// Soft-delete: the session becomes invisible to `get_session`/`list_sessions`
    /// but its rows remain for audit (spec §3 "Session" `deleted_at`).
    pub async fn delete_session(&self, id: &SessionKey) -> Result<()> {
        self.sessions.delete(id).await
    }
}

pub fn validation_error(msg: impl Into<String>) -> Error {
    Error::Validation(msg.into())
}

/// Stamp used when reconstructing a role from wire input that isn't already
/// typed (e.g. building a synthetic `Message` for tests/fixtures).
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_storage::{connect, migrate, PoolConfig};

    async fn test_service() -> (SessionService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("session.db");
        let pool = connect(&PoolConfig {
            database_url: format!("sqlite://{}", db_path.display()),
            ..Default::default()
        })
        .await
        .unwrap();
        migrate(&pool).await.unwrap();
        let events = Arc::new(EventBus::new(128));
        let service = SessionService::new(
            SessionRepository::new(pool.clone()),
            MessageRepository::new(pool),
            events,
        );
        (service, dir)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (service, _dir) = test_service().await;
        let session = service.create_session("user-1").await.unwrap();
        let fetched = service.get_session(&session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
        assert!(fetched.is_active);
    }

    #[tokio::test]
    async fn create_session_with_id_is_idempotent() {
        let (service, _dir) = test_service().await;
        let id = SessionKey::new("fixed-session-id");
        let first = service
            .create_session_with_id(Some(id.clone()), "user-1")
            .await
            .unwrap();
        let second = service
            .create_session_with_id(Some(id.clone()), "user-1")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);

        let page = service.list_sessions("user-1", false, 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn resolve_session_mints_new_for_placeholder() {
        let (service, _dir) = test_service().await;
        let placeholder = SessionKey::new("new_abc");
        let session = service
            .resolve_session(Some(&placeholder), "user-1")
            .await
            .unwrap();
        assert_ne!(session.id, placeholder);
    }

    #[tokio::test]
    async fn resolve_session_mints_new_when_absent() {
        let (service, _dir) = test_service().await;
        let session = service.resolve_session(None, "user-1").await.unwrap();
        assert!(service.get_session(&session.id).await.is_ok());
    }

    #[tokio::test]
    async fn add_message_bumps_last_activity_and_publishes() {
        let (service, _dir) = test_service().await;
        let session = service.create_session("user-1").await.unwrap();
        let before = service.get_session(&session.id).await.unwrap().last_activity_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service
            .append_user_message(&session.id, "hello")
            .await
            .unwrap();

        let after = service.get_session(&session.id).await.unwrap().last_activity_at;
        assert!(after >= before);

        let history = service.get_history(&session.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn delete_session_soft_deletes() {
        let (service, _dir) = test_service().await;
        let session = service.create_session("user-1").await.unwrap();
        service.delete_session(&session.id).await.unwrap();

        let err = service.get_session(&session.id).await;
        assert!(matches!(err, Err(Error::SessionDeleted(_))));
    }

    #[tokio::test]
    async fn list_sessions_paginates_by_recency() {
        let (service, _dir) = test_service().await;
        for _ in 0..3 {
            service.create_session("user-1").await.unwrap();
        }
        let page = service.list_sessions("user-1", false, 1, 2).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
    }
}

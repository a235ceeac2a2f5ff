//! Append-only message log (spec §3 "Message", §4.2 `get_history`).

use chrono::{DateTime, Utc};
use conclave_core::{Error, Message, Result, Role, SessionKey, ToolCall};
use sqlx::{FromRow, SqlitePool};

fn map_sqlx(err: sqlx::Error) -> Error {
    Error::Persistence(err.to_string())
}

pub struct MessageRepository {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct MessageRow {
    id: String,
    session_id: String,
    role: String,
    content: Option<String>,
    name: Option<String>,
    tool_call_id: Option<String>,
    tool_calls: Option<String>,
    timestamp: DateTime<Utc>,
    token_count: Option<i64>,
    metadata: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let role = match row.role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            other => return Err(Error::Internal(format!("unknown message role: {other}"))),
        };
        let tool_calls = row
            .tool_calls
            .as_deref()
            .map(serde_json::from_str::<Vec<ToolCall>>)
            .transpose()
            .map_err(|e| Error::Internal(format!("corrupt tool_calls json: {e}")))?;
        let metadata = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("corrupt metadata json: {e}")))?;

        Ok(Message {
            id: row.id,
            session_id: SessionKey::new(row.session_id),
            role,
            content: row.content,
            name: row.name,
            tool_call_id: row.tool_call_id,
            tool_calls,
            timestamp: row.timestamp,
            token_count: row.token_count.map(|n| n as u32),
            metadata,
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message, assigning it the next sequence number for its session.
    pub async fn append(&self, message: &Message) -> Result<()> {
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(e.to_string()))?;
        let metadata_json = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(e.to_string()))?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE session_id = ?",
        )
        .bind(message.session_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "INSERT INTO messages
               (id, session_id, role, content, name, tool_call_id, tool_calls, timestamp, token_count, metadata, seq)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(message.session_id.as_str())
        .bind(role_str(message.role))
        .bind(&message.content)
        .bind(&message.name)
        .bind(&message.tool_call_id)
        .bind(tool_calls_json)
        .bind(message.timestamp)
        .bind(message.token_count.map(|n| n as i64))
        .bind(metadata_json)
        .bind(next_seq)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    /// Append one message and bump its session's `last_activity_at` to the
    /// message's own `timestamp`, both in a single transaction (spec §4.2
    /// "atomically in one transaction"; §8 invariant 3:
    /// `last_activity_at == max(msg.timestamp for msg in messages)`).
    pub async fn append_bumping_session(&self, message: &Message) -> Result<()> {
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(e.to_string()))?;
        let metadata_json = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE session_id = ?",
        )
        .bind(message.session_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "INSERT INTO messages
               (id, session_id, role, content, name, tool_call_id, tool_calls, timestamp, token_count, metadata, seq)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(message.session_id.as_str())
        .bind(role_str(message.role))
        .bind(&message.content)
        .bind(&message.name)
        .bind(&message.tool_call_id)
        .bind(tool_calls_json)
        .bind(message.timestamp)
        .bind(message.token_count.map(|n| n as i64))
        .bind(metadata_json)
        .bind(next_seq)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query("UPDATE sessions SET last_activity_at = ? WHERE id = ?")
            .bind(message.timestamp)
            .bind(message.session_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    /// Full history in append order, oldest first.
    pub async fn history(&self, session_id: &SessionKey) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, session_id, role, content, name, tool_call_id, tool_calls, timestamp, token_count, metadata
             FROM messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(Message::try_from).collect()
    }

    /// Most recent `limit` messages, returned oldest first (used to bound context
    /// sent to the LLM without paging through the whole log).
    pub async fn recent(&self, session_id: &SessionKey, limit: u32) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, session_id, role, content, name, tool_call_id, tool_calls, timestamp, token_count, metadata
             FROM messages WHERE session_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(session_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut messages: Vec<Message> = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<_>>()?;
        messages.reverse();
        Ok(messages)
    }
}

//! Agent context persistence (spec §3 "AgentContext", §4.4).

use chrono::{DateTime, Utc};
use conclave_core::{AgentContext, AgentSwitch, AgentType, Error, Result, SessionKey};
use sqlx::{FromRow, SqlitePool};

fn map_sqlx(err: sqlx::Error) -> Error {
    Error::Persistence(err.to_string())
}

pub struct AgentContextRepository {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct AgentContextRow {
    session_id: String,
    current_agent: String,
    history: String,
    switch_count: i64,
    created_at: DateTime<Utc>,
    last_switch_at: Option<DateTime<Utc>>,
    metadata: String,
}

fn parse_agent(s: &str) -> Result<AgentType> {
    AgentType::parse(s).ok_or_else(|| Error::Internal(format!("unknown agent type: {s}")))
}

impl TryFrom<AgentContextRow> for AgentContext {
    type Error = Error;

    fn try_from(row: AgentContextRow) -> Result<Self> {
        let history: Vec<AgentSwitch> = serde_json::from_str(&row.history)
            .map_err(|e| Error::Internal(format!("corrupt agent switch history: {e}")))?;
        let metadata = serde_json::from_str(&row.metadata)
            .map_err(|e| Error::Internal(format!("corrupt agent context metadata: {e}")))?;

        Ok(AgentContext {
            session_id: SessionKey::new(row.session_id),
            current_agent: parse_agent(&row.current_agent)?,
            history,
            switch_count: row.switch_count as u32,
            created_at: row.created_at,
            last_switch_at: row.last_switch_at,
            metadata,
        })
    }
}

impl AgentContextRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, session_id: &SessionKey) -> Result<Option<AgentContext>> {
        let row: Option<AgentContextRow> = sqlx::query_as(
            "SELECT session_id, current_agent, history, switch_count, created_at, last_switch_at, metadata
             FROM agent_contexts WHERE session_id = ?",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(AgentContext::try_from).transpose()
    }

    /// Insert a fresh context if none exists, otherwise return the existing one.
    pub async fn get_or_create(
        &self,
        session_id: &SessionKey,
        initial_agent: AgentType,
    ) -> Result<AgentContext> {
        if let Some(existing) = self.get(session_id).await? {
            return Ok(existing);
        }

        let ctx = AgentContext::new(session_id.clone(), initial_agent);
        self.insert(&ctx).await?;
        Ok(ctx)
    }

    async fn insert(&self, ctx: &AgentContext) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_contexts
               (session_id, current_agent, history, switch_count, created_at, last_switch_at, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ctx.session_id.as_str())
        .bind(ctx.current_agent.as_str())
        .bind(serde_json::to_string(&ctx.history).unwrap_or_default())
        .bind(ctx.switch_count as i64)
        .bind(ctx.created_at)
        .bind(ctx.last_switch_at)
        .bind(serde_json::to_string(&ctx.metadata).unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    /// Persist the full context after an in-memory `apply_switch`.
    pub async fn save(&self, ctx: &AgentContext) -> Result<()> {
        let result = sqlx::query(
            "UPDATE agent_contexts
             SET current_agent = ?, history = ?, switch_count = ?, last_switch_at = ?, metadata = ?
             WHERE session_id = ?",
        )
        .bind(ctx.current_agent.as_str())
        .bind(serde_json::to_string(&ctx.history).unwrap_or_default())
        .bind(ctx.switch_count as i64)
        .bind(ctx.last_switch_at)
        .bind(serde_json::to_string(&ctx.metadata).unwrap_or_default())
        .bind(ctx.session_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            self.insert(ctx).await?;
        }
        Ok(())
    }
}

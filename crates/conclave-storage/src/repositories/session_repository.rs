//! Session CRUD (spec §4.2).

use chrono::{DateTime, Utc};
use conclave_core::{Error, Page, Result, Session, SessionKey};
use sqlx::{FromRow, SqlitePool};

fn map_sqlx(err: sqlx::Error) -> Error {
    Error::Persistence(err.to_string())
}

pub struct SessionRepository {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    is_active: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: SessionKey::new(row.id),
            user_id: row.user_id,
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
            is_active: row.is_active,
            deleted_at: row.deleted_at,
        }
    }
}

const SELECT_COLUMNS: &str = "id, user_id, created_at, last_activity_at, is_active, deleted_at";

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str) -> Result<Session> {
        self.create_with_id(None, user_id).await
    }

    /// Create a session, optionally pinning its id. If `id` is supplied and
    /// already names an active session, that session is returned unchanged
    /// instead of inserting a duplicate row (spec §4.2 `create_session`
    /// idempotence, §8 "Idempotence" law).
    pub async fn create_with_id(&self, id: Option<&SessionKey>, user_id: &str) -> Result<Session> {
        if let Some(id) = id {
            if let Some(existing) = self.get_active(id).await? {
                return Ok(existing);
            }
        }

        let session = Session::new(id.cloned().unwrap_or_else(SessionKey::generate), user_id);
        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, last_activity_at, is_active, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.as_str())
        .bind(&session.user_id)
        .bind(session.created_at)
        .bind(session.last_activity_at)
        .bind(session.is_active)
        .bind(session.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(session)
    }

    pub async fn get(&self, id: &SessionKey) -> Result<Session> {
        let row: SessionRow = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| Error::SessionNotFound(id.as_str().to_string()))?;

        if row.deleted_at.is_some() {
            return Err(Error::SessionDeleted(id.as_str().to_string()));
        }
        Ok(row.into())
    }

    /// Like [`Self::get`], but returns `None` instead of erroring when the
    /// session is missing or soft-deleted — used by `create_with_id` to
    /// decide whether an explicit id collides with a live session.
    async fn get_active(&self, id: &SessionKey) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(match row {
            Some(row) if row.deleted_at.is_none() => Some(row.into()),
            _ => None,
        })
    }

    pub async fn touch(&self, id: &SessionKey) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_activity_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    pub async fn delete(&self, id: &SessionKey) -> Result<()> {
        let result = sqlx::query(
            "UPDATE sessions SET deleted_at = ?, is_active = 0 WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(Error::SessionNotFound(id.as_str().to_string()));
        }
        Ok(())
    }

    pub async fn list(
        &self,
        user_id: &str,
        include_deleted: bool,
        page: u32,
        size: u32,
    ) -> Result<Page<Session>> {
        let offset = (page.saturating_sub(1) as i64) * size as i64;
        let deleted_clause = if include_deleted { "" } else { "AND deleted_at IS NULL" };

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM sessions WHERE user_id = ? {deleted_clause}"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions
             WHERE user_id = ? {deleted_clause}
             ORDER BY last_activity_at DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(Page {
            items: rows.into_iter().map(Into::into).collect(),
            page,
            size,
            total: total.max(0) as u64,
        })
    }

    /// Sessions inactive long enough to be soft-deleted by the background
    /// cleanup sweep (spec §5: hourly, default 24h).
    pub async fn soft_delete_inactive(&self, idle_after: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - idle_after;
        let result = sqlx::query(
            "UPDATE sessions SET deleted_at = ?, is_active = 0
             WHERE deleted_at IS NULL AND last_activity_at < ?",
        )
        .bind(Utc::now())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    /// Hard-delete soft-deleted rows past the retention window (spec §5: 30d).
    /// Cascades to messages/contexts/approvals via FK `ON DELETE CASCADE`.
    pub async fn purge_deleted(&self, older_than: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - older_than;
        let result = sqlx::query("DELETE FROM sessions WHERE deleted_at IS NOT NULL AND deleted_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

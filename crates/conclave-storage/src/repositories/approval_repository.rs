//! Pending HITL approvals (spec §3 "PendingApproval", §5).

use chrono::{DateTime, Duration, Utc};
use conclave_core::{ApprovalStatus, Error, PendingApproval, Result, SessionKey};
use sqlx::{FromRow, SqlitePool};

fn map_sqlx(err: sqlx::Error) -> Error {
    Error::Persistence(err.to_string())
}

pub struct ApprovalRepository {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct ApprovalRow {
    call_id: String,
    session_id: String,
    tool_name: String,
    arguments: String,
    created_at: DateTime<Utc>,
    status: String,
    decision_feedback: Option<String>,
    modified_arguments: Option<String>,
}

fn parse_status(s: &str) -> Result<ApprovalStatus> {
    match s {
        "pending" => Ok(ApprovalStatus::Pending),
        "approved" => Ok(ApprovalStatus::Approved),
        "rejected" => Ok(ApprovalStatus::Rejected),
        "edited" => Ok(ApprovalStatus::Edited),
        other => Err(Error::Internal(format!("unknown approval status: {other}"))),
    }
}

fn status_str(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
        ApprovalStatus::Edited => "edited",
    }
}

impl TryFrom<ApprovalRow> for PendingApproval {
    type Error = Error;

    fn try_from(row: ApprovalRow) -> Result<Self> {
        let arguments = serde_json::from_str(&row.arguments)
            .map_err(|e| Error::Internal(format!("corrupt approval arguments: {e}")))?;
        let modified_arguments = row
            .modified_arguments
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("corrupt modified_arguments: {e}")))?;

        Ok(PendingApproval {
            call_id: row.call_id,
            session_id: SessionKey::new(row.session_id),
            tool_name: row.tool_name,
            arguments,
            created_at: row.created_at,
            status: parse_status(&row.status)?,
            decision_feedback: row.decision_feedback,
            modified_arguments,
        })
    }
}

const SELECT_COLUMNS: &str =
    "call_id, session_id, tool_name, arguments, created_at, status, decision_feedback, modified_arguments";

impl ApprovalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, approval: &PendingApproval) -> Result<()> {
        sqlx::query(
            "INSERT INTO pending_approvals
               (call_id, session_id, tool_name, arguments, created_at, status, decision_feedback, modified_arguments)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&approval.call_id)
        .bind(approval.session_id.as_str())
        .bind(&approval.tool_name)
        .bind(serde_json::to_string(&approval.arguments).unwrap_or_default())
        .bind(approval.created_at)
        .bind(status_str(approval.status))
        .bind(&approval.decision_feedback)
        .bind(
            approval
                .modified_arguments
                .as_ref()
                .map(|v| serde_json::to_string(v).unwrap_or_default()),
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    pub async fn get(&self, call_id: &str) -> Result<PendingApproval> {
        let row: ApprovalRow = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM pending_approvals WHERE call_id = ?"
        ))
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| Error::Validation(format!("no pending approval for call {call_id}")))?;

        row.try_into()
    }

    /// Resolve a pending approval idempotently: once a call has a terminal
    /// status, resolving again — with the same decision or a different one —
    /// is a no-op that returns the original resolution unchanged (spec §8
    /// "HITL idempotence": `resolve(call_id, d)` followed by
    /// `resolve(call_id, d')` is a no-op for the second call, regardless of
    /// whether `d == d'`).
    pub async fn resolve(
        &self,
        call_id: &str,
        status: ApprovalStatus,
        feedback: Option<String>,
        modified_arguments: Option<serde_json::Value>,
    ) -> Result<PendingApproval> {
        let existing = self.get(call_id).await?;

        if existing.status != ApprovalStatus::Pending {
            return Ok(existing);
        }

        sqlx::query(
            "UPDATE pending_approvals
             SET status = ?, decision_feedback = ?, modified_arguments = ?
             WHERE call_id = ? AND status = 'pending'",
        )
        .bind(status_str(status))
        .bind(&feedback)
        .bind(
            modified_arguments
                .as_ref()
                .map(|v| serde_json::to_string(v).unwrap_or_default()),
        )
        .bind(call_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        self.get(call_id).await
    }

    /// Approvals still awaiting a decision for one session, used to replay
    /// unresolved approvals when a client resumes (spec §3 "PendingApproval").
    pub async fn list_pending(&self, session_id: &SessionKey) -> Result<Vec<PendingApproval>> {
        let rows: Vec<ApprovalRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM pending_approvals
             WHERE session_id = ? AND status = 'pending'
             ORDER BY created_at ASC"
        ))
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(PendingApproval::try_from).collect()
    }

    /// Remove every pending approval for a session (spec §4.2 `delete_session`:
    /// "removes pending approvals").
    pub async fn delete_for_session(&self, session_id: &SessionKey) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_approvals WHERE session_id = ?")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    /// Delete approvals older than `max_age` that never received a decision
    /// (admin cleanup sweep, spec §5, default 24h).
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM pending_approvals WHERE status = 'pending' AND created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

//! HITL Service (spec §4.4): pending-approval CRUD, idempotent resolution,
//! and the admin cleanup sweep for stale approvals (spec §5).

use conclave_agent::catalog;
use conclave_core::{ApprovalStatus, Error, HitlDecision, PendingApproval, Result, SessionKey};
use conclave_events::{Event, EventBus, EventPayload};
use conclave_storage::ApprovalRepository;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Side-effecting tools require human approval before the orchestrator will
/// act on them; read-only tools never do (spec §4.4).
pub fn requires_approval(tool_name: &str) -> bool {
    catalog::is_side_effecting(tool_name)
}

pub struct HitlService {
    approvals: ApprovalRepository,
    events: Arc<EventBus>,
}

impl HitlService {
    pub fn new(approvals: ApprovalRepository, events: Arc<EventBus>) -> Self {
        Self { approvals, events }
    }

    /// Record a new pending approval for a side-effecting tool_call and
    /// publish `HitlRequested`.
    pub async fn create_pending(
        &self,
        session_id: &SessionKey,
        call_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<PendingApproval> {
        let approval = PendingApproval {
            call_id: call_id.to_string(),
            session_id: session_id.clone(),
            tool_name: tool_name.to_string(),
            arguments,
            created_at: chrono::Utc::now(),
            status: ApprovalStatus::Pending,
            decision_feedback: None,
            modified_arguments: None,
        };
        self.approvals.create(&approval).await?;

        self.events.publish(
            Event::new(
                EventPayload::HitlRequested {
                    call_id: call_id.to_string(),
                    tool_name: tool_name.to_string(),
                },
                Some(session_id.clone()),
            ),
        );

        Ok(approval)
    }

    /// Approvals still awaiting a decision — used to replay unresolved
    /// approvals when a client resumes a session (spec §3 "PendingApproval").
    pub async fn list_pending(&self, session_id: &SessionKey) -> Result<Vec<PendingApproval>> {
        self.approvals.list_pending(session_id).await
    }

    pub async fn get(&self, call_id: &str) -> Result<PendingApproval> {
        self.approvals.get(call_id).await
    }

    /// Resolve a pending approval. Idempotent: resolving an already-resolved
    /// id is always a no-op that returns the original resolution, even if
    /// the second call names a different decision (spec §4.4, §8 "HITL
    /// idempotence").
    pub async fn resolve(
        &self,
        call_id: &str,
        decision: HitlDecision,
        feedback: Option<String>,
        modified_arguments: Option<serde_json::Value>,
    ) -> Result<PendingApproval> {
        let status = match decision {
            HitlDecision::Approve => ApprovalStatus::Approved,
            HitlDecision::Reject => ApprovalStatus::Rejected,
            HitlDecision::Edit => ApprovalStatus::Edited,
        };

        let resolved = self
            .approvals
            .resolve(call_id, status, feedback, modified_arguments)
            .await?;

        self.events.publish(Event::new(
            EventPayload::HitlDecided {
                call_id: call_id.to_string(),
                decision: format!("{decision:?}").to_lowercase(),
            },
            Some(resolved.session_id.clone()),
        ));

        Ok(resolved)
    }

    /// Remove every pending approval for a session, used when a session is
    /// deleted (spec §4.2 `delete_session`: "removes pending approvals").
    pub async fn delete_for_session(&self, session_id: &SessionKey) -> Result<u64> {
        self.approvals.delete_for_session(session_id).await
    }

    /// Delete approvals that never received a decision within `max_age`
    /// (spec §5: default 24h, no hard timeout — only this admin sweep).
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<u64> {
        let removed = self.approvals.sweep_stale(max_age).await?;
        if removed > 0 {
            info!(removed, "swept stale pending approvals");
        }
        Ok(removed)
    }
}

/// Convenience wrapper surfaced at the gateway boundary when a `hitl_decision`
/// references an unknown or already-terminal call id.
pub fn not_found(call_id: &str) -> Error {
    Error::Validation(format!("no pending approval for call {call_id}"))
}

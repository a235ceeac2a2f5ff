//! The hourly background cleanup sweep (spec §5): soft-deletes idle
//! sessions, purges old soft-deleted rows, evicts idle session locks, and
//! sweeps stale pending approvals.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use conclave_hitl::HitlService;
use conclave_session::SessionLockManager;
use conclave_storage::SessionRepository;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct CleanupConfig {
    pub interval: StdDuration,
    pub session_idle_after: ChronoDuration,
    pub session_purge_after: ChronoDuration,
    pub lock_idle_after: StdDuration,
    pub approval_stale_after: StdDuration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(3600),
            session_idle_after: ChronoDuration::hours(24),
            session_purge_after: ChronoDuration::days(30),
            lock_idle_after: StdDuration::from_secs(24 * 3600),
            approval_stale_after: StdDuration::from_secs(24 * 3600),
        }
    }
}

/// Spawns the recurring sweep; the returned handle is aborted on shutdown.
pub fn spawn_cleanup_task(
    sessions: SessionRepository,
    locks: Arc<SessionLockManager>,
    hitl: Arc<HitlService>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.tick().await; // first tick fires immediately, skip it
        loop {
            ticker.tick().await;
            run_once(&sessions, &locks, &hitl, &config).await;
        }
    })
}

async fn run_once(
    sessions: &SessionRepository,
    locks: &SessionLockManager,
    hitl: &HitlService,
    config: &CleanupConfig,
) {
    match sessions.soft_delete_inactive(config.session_idle_after).await {
        Ok(n) if n > 0 => info!(count = n, "soft-deleted idle sessions"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to soft-delete idle sessions"),
    }

    match sessions.purge_deleted(config.session_purge_after).await {
        Ok(n) if n > 0 => info!(count = n, "purged soft-deleted sessions"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to purge soft-deleted sessions"),
    }

    locks.sweep_idle(config.lock_idle_after);

    match hitl.sweep_stale(config.approval_stale_after).await {
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to sweep stale pending approvals"),
    }
}

//! Session Lock Manager (spec §4.1): scoped mutual exclusion keyed by
//! `session_id`. Every orchestration entry point acquires this lock before
//! touching session state and releases it on generator exit — including on
//! suspension for human input (HITL, tool result), which releases the lock
//! rather than holding it across the wait (spec §5).

use conclave_core::{Error, Result, SessionKey};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

struct Entry {
    mutex: Arc<Mutex<()>>,
    last_touched_secs: AtomicU64,
}

/// A held lock on one session. Dropping it releases the lock; there is no
/// explicit `unlock` — RAII makes the release unconditional, including on
/// panic or early return from the holding generator.
pub struct SessionLockGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Per-`session_id` mutual exclusion with FIFO fairness (spec §4.1). Backed
/// by one `tokio::sync::Mutex` per key — unrelated session ids never
/// contend, and `tokio::sync::Mutex` queues waiters in arrival order.
pub struct SessionLockManager {
    entries: DashMap<SessionKey, Arc<Entry>>,
}

impl Default for SessionLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockManager {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn entry_for(&self, session_id: &SessionKey) -> Arc<Entry> {
        self.entries
            .entry(session_id.clone())
            .or_insert_with(|| {
                Arc::new(Entry {
                    mutex: Arc::new(Mutex::new(())),
                    last_touched_secs: AtomicU64::new(now_secs()),
                })
            })
            .clone()
    }

    /// Acquire the lock for `session_id`, waiting indefinitely. This is the
    /// default for stream handlers (spec §4.1).
    pub async fn lock(&self, session_id: &SessionKey) -> SessionLockGuard {
        let entry = self.entry_for(session_id);
        entry.last_touched_secs.store(now_secs(), Ordering::Relaxed);
        let guard = entry.mutex.clone().lock_owned().await;
        SessionLockGuard { _guard: guard }
    }

    /// Acquire the lock for `session_id`, failing with `LockTimeout` if not
    /// granted within `deadline`. Used by admin operations (spec §4.1:
    /// default 5s).
    pub async fn lock_timeout(
        &self,
        session_id: &SessionKey,
        deadline: Duration,
    ) -> Result<SessionLockGuard> {
        let entry = self.entry_for(session_id);
        entry.last_touched_secs.store(now_secs(), Ordering::Relaxed);
        match timeout(deadline, entry.mutex.clone().lock_owned()).await {
            Ok(guard) => Ok(SessionLockGuard { _guard: guard }),
            Err(_) => Err(Error::LockTimeout(session_id.as_str().to_string())),
        }
    }

    /// Evict entries idle for longer than `idle_after` and not currently
    /// held, bounding the lock cache's size (spec §4.1, §5 hourly cleanup).
    pub fn sweep_idle(&self, idle_after: Duration) {
        let cutoff = now_secs().saturating_sub(idle_after.as_secs());
        self.entries.retain(|_, entry| {
            let idle = entry.last_touched_secs.load(Ordering::Relaxed) < cutoff;
            if !idle {
                return true;
            }
            // try_lock succeeding means nobody holds it right now; the guard
            // drops immediately, releasing it again before we remove the entry.
            entry.mutex.try_lock().is_err()
        });
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

//! Built-in subscribers shipped with the system (spec §4.8).

use crate::bus::EventSubscriber;
use crate::event::{Event, EventPayload, EventType};
use async_trait::async_trait;
use conclave_core::SessionKey;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counts event occurrences by type — backs the `/events/metrics` endpoint.
#[derive(Default)]
pub struct MetricsCollector {
    counts: DashMap<EventType, AtomicU64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, event_type: EventType) -> u64 {
        self.counts
            .get(&event_type)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<(EventType, u64)> {
        self.counts
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

#[async_trait]
impl EventSubscriber for MetricsCollector {
    async fn handle(&self, event: &Event) {
        self.counts
            .entry(event.event_type())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn name(&self) -> &str {
        "metrics_collector"
    }
}

/// Logs every event as a structured tracing record. Durable audit storage is
/// out of scope here; this is the in-process half of "optionally durable".
pub struct AuditLogger;

#[async_trait]
impl EventSubscriber for AuditLogger {
    async fn handle(&self, event: &Event) {
        info!(
            event_id = %event.event_id,
            event_type = ?event.event_type(),
            session_id = event.session_id.as_ref().map(|s| s.as_str()),
            payload = %event.to_json(),
            "audit"
        );
    }

    fn name(&self) -> &str {
        "audit_logger"
    }
}

#[derive(Default, Clone, Copy)]
struct SessionUsage {
    requests_started: u64,
    requests_completed: u64,
    requests_failed: u64,
}

/// Per-session LLM usage rollup (spec §4.8).
#[derive(Default)]
pub struct SessionMetricsCollector {
    usage: DashMap<SessionKey, SessionUsage>,
}

impl SessionMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usage_for(&self, session_id: &SessionKey) -> Option<(u64, u64, u64)> {
        self.usage
            .get(session_id)
            .map(|u| (u.requests_started, u.requests_completed, u.requests_failed))
    }
}

#[async_trait]
impl EventSubscriber for SessionMetricsCollector {
    async fn handle(&self, event: &Event) {
        let Some(session_id) = event.session_id.clone() else {
            return;
        };
        let mut entry = self.usage.entry(session_id).or_insert_with(SessionUsage::default);
        match &event.payload {
            EventPayload::LlmRequestStarted { .. } => entry.requests_started += 1,
            EventPayload::LlmRequestCompleted { .. } => entry.requests_completed += 1,
            EventPayload::LlmRequestFailed { .. } => entry.requests_failed += 1,
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "session_metrics_collector"
    }
}

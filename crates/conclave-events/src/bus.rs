//! The event bus (spec §4.8).
//!
//! `publish` is synchronous from the caller's perspective — it only has to
//! push onto an internal channel — while dispatch to subscribers happens on
//! a single background task. Because that task drains the channel strictly
//! in arrival order, per-(session_id, event_type) ordering falls out of
//! global FIFO ordering; we don't need to track sessions or types specially
//! to get it.

use crate::event::{Event, EventType};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// A consumer of published events. Implementations must not panic across an
/// await point in a way that would poison shared state — the bus catches
/// panics at the call boundary, but state the handler was mutating may still
/// be left inconsistent.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: &Event);

    fn name(&self) -> &str;
}

struct Subscription {
    event_type: Option<EventType>,
    priority: i32,
    subscriber: Arc<dyn EventSubscriber>,
}

/// In-process typed publish/subscribe bus.
pub struct EventBus {
    tx: mpsc::Sender<Event>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    handler_failures: Arc<AtomicU64>,
}

impl EventBus {
    /// Spawns the dispatch task immediately; `capacity` bounds how many
    /// published-but-undispatched events may be buffered before `publish`
    /// starts applying backpressure.
    pub fn new(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity);
        let subscriptions: Arc<RwLock<Vec<Subscription>>> = Arc::new(RwLock::new(Vec::new()));
        let handler_failures = Arc::new(AtomicU64::new(0));

        let subs_for_task = subscriptions.clone();
        let failures_for_task = handler_failures.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let subs = subs_for_task.read().await;
                let event_type = event.event_type();
                for sub in subs.iter() {
                    if sub.event_type.is_some() && sub.event_type != Some(event_type) {
                        continue;
                    }
                    let outcome = AssertUnwindSafe(sub.subscriber.handle(&event))
                        .catch_unwind()
                        .await;
                    if outcome.is_err() {
                        failures_for_task.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            subscriber = sub.subscriber.name(),
                            event_type = ?event_type,
                            "event subscriber panicked"
                        );
                    }
                }
            }
        });

        Self {
            tx,
            subscriptions,
            handler_failures,
        }
    }

    /// Register a subscriber. `event_type = None` subscribes to everything.
    /// Lower `priority` runs first among subscribers matching the same event.
    pub async fn subscribe(
        &self,
        event_type: Option<EventType>,
        subscriber: Arc<dyn EventSubscriber>,
        priority: i32,
    ) {
        let mut subs = self.subscriptions.write().await;
        subs.push(Subscription {
            event_type,
            priority,
            subscriber,
        });
        subs.sort_by_key(|s| s.priority);
    }

    /// Enqueue `event` for dispatch. Returns once the event is queued, not
    /// once subscribers have run.
    pub fn publish(&self, event: Event) {
        if let Err(err) = self.tx.try_send(event) {
            tracing::warn!(error = %err, "event bus channel full or closed, dropping event");
        }
    }

    pub fn handler_failure_count(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }
}

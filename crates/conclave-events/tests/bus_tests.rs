use async_trait::async_trait;
use conclave_core::SessionKey;
use conclave_events::{Event, EventBus, EventPayload, EventSubscriber, EventType, MetricsCollector, SessionMetricsCollector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct RecordingSubscriber {
    label: &'static str,
    seen: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl EventSubscriber for RecordingSubscriber {
    async fn handle(&self, _event: &Event) {
        self.seen.lock().await.push(self.label);
    }

    fn name(&self) -> &str {
        self.label
    }
}

struct PanickingSubscriber;

#[async_trait]
impl EventSubscriber for PanickingSubscriber {
    async fn handle(&self, _event: &Event) {
        panic!("intentional failure for isolation test");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn subscribers_run_in_priority_order() {
    let bus = EventBus::new(16);
    let seen = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe(
        None,
        Arc::new(RecordingSubscriber {
            label: "second",
            seen: seen.clone(),
        }),
        10,
    )
    .await;
    bus.subscribe(
        None,
        Arc::new(RecordingSubscriber {
            label: "first",
            seen: seen.clone(),
        }),
        1,
    )
    .await;

    bus.publish(Event::new(EventPayload::SystemStartup, None));
    settle().await;

    let order = seen.lock().await.clone();
    assert_eq!(order, vec!["first", "second"]);
}

#[tokio::test]
async fn subscriber_panic_is_isolated_and_counted() {
    let bus = EventBus::new(16);
    let seen = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe(None, Arc::new(PanickingSubscriber), 0).await;
    bus.subscribe(
        None,
        Arc::new(RecordingSubscriber {
            label: "survivor",
            seen: seen.clone(),
        }),
        1,
    )
    .await;

    bus.publish(Event::new(EventPayload::SystemStartup, None));
    settle().await;

    assert_eq!(*seen.lock().await, vec!["survivor"]);
    assert_eq!(bus.handler_failure_count(), 1);
}

#[tokio::test]
async fn event_type_filter_only_dispatches_matching_events() {
    let bus = EventBus::new(16);
    let seen = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe(
        Some(EventType::SystemShutdown),
        Arc::new(RecordingSubscriber {
            label: "shutdown_only",
            seen: seen.clone(),
        }),
        0,
    )
    .await;

    bus.publish(Event::new(EventPayload::SystemStartup, None));
    settle().await;
    assert!(seen.lock().await.is_empty());

    bus.publish(Event::new(EventPayload::SystemShutdown, None));
    settle().await;
    assert_eq!(*seen.lock().await, vec!["shutdown_only"]);
}

#[tokio::test]
async fn metrics_collector_counts_by_event_type() {
    let bus = EventBus::new(16);
    let metrics = Arc::new(MetricsCollector::new());
    bus.subscribe(None, metrics.clone(), 0).await;

    bus.publish(Event::new(EventPayload::SystemStartup, None));
    bus.publish(Event::new(EventPayload::SystemStartup, None));
    bus.publish(Event::new(EventPayload::SystemShutdown, None));
    settle().await;

    assert_eq!(metrics.count(EventType::SystemStartup), 2);
    assert_eq!(metrics.count(EventType::SystemShutdown), 1);
}

#[tokio::test]
async fn session_metrics_collector_rolls_up_llm_usage_per_session() {
    let bus = EventBus::new(16);
    let session_metrics = Arc::new(SessionMetricsCollector::new());
    bus.subscribe(None, session_metrics.clone(), 0).await;

    let session_id = SessionKey::new("s1");
    bus.publish(Event::new(
        EventPayload::LlmRequestStarted {
            model: "test-model".into(),
        },
        Some(session_id.clone()),
    ));
    bus.publish(Event::new(
        EventPayload::LlmRequestCompleted {
            model: "test-model".into(),
            duration_ms: 120,
            finish_reason: "stop".into(),
        },
        Some(session_id.clone()),
    ));
    settle().await;

    let (started, completed, failed) = session_metrics.usage_for(&session_id).unwrap();
    assert_eq!(started, 1);
    assert_eq!(completed, 1);
    assert_eq!(failed, 0);
    assert!(session_metrics.usage_for(&SessionKey::new("other")).is_none());
}

#[tokio::test]
async fn events_within_a_type_preserve_publish_order() {
    let bus = EventBus::new(64);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    struct OrderRecorder {
        seen: Arc<Mutex<Vec<usize>>>,
        counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for OrderRecorder {
        async fn handle(&self, _event: &Event) {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().await.push(n);
        }

        fn name(&self) -> &str {
            "order_recorder"
        }
    }

    bus.subscribe(
        None,
        Arc::new(OrderRecorder {
            seen: seen.clone(),
            counter: counter.clone(),
        }),
        0,
    )
    .await;

    for _ in 0..20 {
        bus.publish(Event::new(EventPayload::SystemStartup, None));
    }
    settle().await;

    let recorded = seen.lock().await.clone();
    let sorted: Vec<usize> = {
        let mut v = recorded.clone();
        v.sort();
        v
    };
    assert_eq!(recorded, sorted, "dispatch order must match publish order");
    assert_eq!(recorded.len(), 20);
}

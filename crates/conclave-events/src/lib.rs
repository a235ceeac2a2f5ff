//! Typed publish/subscribe event bus (spec §4.8).

pub mod bus;
pub mod event;
pub mod subscribers;

pub use bus::{EventBus, EventSubscriber};
pub use event::{Event, EventPayload, EventType};
pub use subscribers::{AuditLogger, MetricsCollector, SessionMetricsCollector};

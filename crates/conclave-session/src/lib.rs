//! Session Service, Agent Context Service, and the Session Lock Manager
//! (spec §4.1–§4.3).

pub mod agent_context_service;
pub mod lock;
pub mod session_service;

pub use agent_context_service::AgentContextService;
pub use lock::{SessionLockGuard, SessionLockManager};
pub use session_service::SessionService;

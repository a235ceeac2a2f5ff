//! Sqlite-backed persistence layer.
//!
//! Everything above this crate talks to repositories, never to `sqlx`
//! directly — swapping the backing store means changing this crate alone.

pub mod pool;
pub mod repositories;

pub use pool::{connect, migrate, PoolConfig};
pub use repositories::{
    AgentContextRepository, ApprovalRepository, MessageRepository, SessionRepository,
};
pub use sqlx::SqlitePool;

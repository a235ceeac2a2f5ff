//! Orchestration Service (spec §4.7): the central state machine that turns
//! client requests into streamed [`Chunk`](conclave_core::Chunk)s, driving
//! the Session Service, Agent Context Service, HITL Service, and LLM Driver.

pub mod service;

pub use service::{session_not_found, ChunkStream, Orchestrator};

//! Conclave Core — shared types, wire protocol, and error handling.
//!
//! No I/O lives here: every other crate in the workspace depends on this
//! one for the vocabulary (sessions, messages, agents, chunks) without
//! pulling in storage, networking, or the LLM driver.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{Error, LlmErrorKind, Result};
pub use protocol::*;
pub use types::*;

//! HITL Service (spec §4.4): stores, queries, and resolves pending tool-call
//! approvals that gate side-effecting tools behind a human decision.

pub mod service;

pub use service::{requires_approval, HitlService};

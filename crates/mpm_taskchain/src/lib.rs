//! Protocol-driven task chain state machine.
//!
//! The engine in [`engine`] is pure: it mutates an in-memory [`TaskChain`]
//! and reports what happened as an ordered list of events. The store in
//! [`store`] wraps it with SQLite persistence: a `phases_json` snapshot per
//! chain (fast path for resume) plus an append-only event log (audit).

pub mod engine;
pub mod protocol;
pub mod store;

pub use engine::{
    ChainError, ChainStatus, CompleteSubOutcome, EngineEvent, EventType, GateOutcome, GateResult,
    Phase, PhaseStatus, PhaseType, SubTask, SubTaskSpec, SubTaskStatus, TaskChain,
};
pub use protocol::build_protocol;
pub use store::{status_view, ChainStore, EventRow};

//! Deterministic folds over the event log.
//!
//! A [`Projection`] turns an ordered envelope sequence into typed state
//! without touching the clock, randomness or I/O. The [`ProjectionEngine`]
//! keeps one cached state and offset per registered projection over a shared
//! store and catches them up incrementally.

mod engine;
mod projection;

pub mod cognitive;
pub mod execution;
pub mod semantic;

pub use cognitive::{CognitiveProjection, CognitiveState, MemoryEntry, MemoryLink, ReasoningTrace};
pub use engine::ProjectionEngine;
pub use execution::{ExecutionProjection, ExecutionState, NodeStats, TaskStatus, ToolStats};
pub use projection::{Projection, decode_event};
pub use semantic::{IndexEntry, SemanticProjection, SemanticState};

/// Registration names used by the kernel wiring.
pub mod names {
    pub const EXECUTION: &str = "execution";
    pub const COGNITIVE: &str = "cognitive";
    pub const SEMANTIC: &str = "semantic";
    pub const CAPABILITY: &str = "capability";
}

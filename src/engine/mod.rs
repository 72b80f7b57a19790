// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`sequencer`] runs a [`Sequence`] of positions, each position a group of
//!   tasks scheduled in parallel through a fresh [`Scheduler`](crate::dag::Scheduler).
//! - [`queue`] decides what happens to watch triggers that arrive while a
//!   rebuild is running.
//! - [`runtime`] is the watch event loop reacting to file triggers,
//!   finished rebuilds and shutdown.

pub mod queue;
pub mod runtime;
pub mod sequencer;

pub use queue::{TriggerQueue, TriggerWhileRunningBehaviour};
pub use runtime::{Runtime, RuntimeEvent, TriggerReason};
pub use sequencer::{Claim, Sequence, Sequencer};

/// Task names are plain strings throughout the engine.
pub type TaskName = String;

/// Result of running one task, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(String),
}

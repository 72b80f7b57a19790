// src/dag/mod.rs

//! Prerequisite graph and per-run scheduling.
//!
//! - [`graph`] holds the adjacency (prerequisites and dependents) of the
//!   registered tasks.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready to run and fails the dependents of a failed task.

pub mod graph;
pub mod scheduler;

pub use graph::DagGraph;
pub use scheduler::{ScheduledTask, Scheduler};

// src/exec/mod.rs

//! Execution layer.
//!
//! - [`executor`] consumes [`ScheduledTask`](crate::dag::ScheduledTask)s and
//!   runs each task body on its own tokio task, reporting a
//!   [`TaskCompletion`] back to the sequencer.
//! - [`tool`] runs the external collaborators (bundler, transpiler, JS
//!   minifier) through `tokio::process`.

pub mod executor;
pub mod tool;

pub use executor::{TaskCompletion, execute, spawn_executor};
pub use tool::ToolCommand;

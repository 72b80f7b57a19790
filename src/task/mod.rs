// src/task/mod.rs

//! Task registry.
//!
//! A [`Task`] is a unique name, a list of prerequisite task names and a
//! [`TaskBody`]: an async action, a nested [`Sequence`](crate::engine::Sequence),
//! or nothing at all (a pure prerequisite group such as `style`).
//!
//! The registry is filled once at startup (see [`crate::builtin`]) and
//! validated as a whole before anything runs: every referenced name must
//! exist and the prerequisite graph must be acyclic.

pub mod registry;

pub use registry::{Task, TaskAction, TaskBody, TaskContext, TaskRegistry};

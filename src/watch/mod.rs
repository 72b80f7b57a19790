// src/watch/mod.rs

//! File watching.
//!
//! - [`patterns`] compiles watch bindings (path role -> task) into glob
//!   profiles.
//! - [`watcher`] wires a cross-platform `notify` watcher to the runtime
//!   channel.
//!
//! Nothing here knows about prerequisites; a change only names the bound
//! task.

pub mod patterns;
pub mod watcher;

pub use patterns::{TaskWatchProfile, build_task_watch_profiles};
pub use watcher::{WatcherHandle, spawn_watcher};

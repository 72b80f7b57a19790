// src/watch/patterns.rs

use std::collections::BTreeMap;
use std::fmt;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::BindingConfig;
use crate::engine::TaskName;
use crate::errors::{KitforgeError, Result};
use crate::paths::PathTable;

/// Compiled globs for one bound task. Paths passed to [`matches`] are
/// relative to the project root with forward slashes; `*` stops at `/`.
///
/// [`matches`]: TaskWatchProfile::matches
#[derive(Clone)]
pub struct TaskWatchProfile {
    name: TaskName,
    patterns: Vec<String>,
    watch_set: GlobSet,
}

impl fmt::Debug for TaskWatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWatchProfile")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl TaskWatchProfile {
    pub fn new(name: impl Into<TaskName>, patterns: Vec<String>) -> Result<Self> {
        let name = name.into();
        let watch_set = build_globset(&patterns)
            .map_err(|e| KitforgeError::config(format!("watch patterns for '{name}': {e}")))?;
        Ok(Self {
            name,
            patterns,
            watch_set,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.watch_set.is_match(rel_path)
    }
}

/// One profile per bound task; several bindings for the same task merge
/// their role globs.
pub fn build_task_watch_profiles(
    bindings: &[BindingConfig],
    paths: &PathTable,
) -> Result<Vec<TaskWatchProfile>> {
    let mut per_task: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for binding in bindings {
        let globs = paths.get(&binding.role)?;
        per_task
            .entry(binding.task.as_str())
            .or_default()
            .extend(globs.iter().cloned());
    }

    per_task
        .into_iter()
        .map(|(task, patterns)| TaskWatchProfile::new(task, patterns))
        .collect()
}

fn build_globset(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(GlobBuilder::new(pat).literal_separator(true).build()?);
    }
    builder.build()
}

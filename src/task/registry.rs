// src/task/registry.rs

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::context::BuildContext;
use crate::engine::{Sequence, Sequencer, TaskName};
use crate::errors::{KitforgeError, Result};
use crate::session::Session;

/// The work a task performs once its prerequisites have settled.
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<()>;
}

#[async_trait]
impl<F, Fut> TaskAction for F
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        (self)(ctx).await
    }
}

/// Handle given to a running task.
///
/// Nested sequences started through [`TaskContext::sequencer`] share the
/// current top-level invocation, so a prerequisite that already ran is not
/// run again.
#[derive(Clone)]
pub struct TaskContext {
    task: TaskName,
    sequencer: Sequencer,
}

impl TaskContext {
    pub fn new(task: impl Into<TaskName>, sequencer: Sequencer) -> Self {
        Self {
            task: task.into(),
            sequencer,
        }
    }

    /// Name of the running task.
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn build(&self) -> &BuildContext {
        self.sequencer.build()
    }

    pub fn session(&self) -> &Session {
        self.sequencer.session()
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

/// What a task does after its prerequisites.
#[derive(Clone)]
pub enum TaskBody {
    /// Prerequisites only.
    Group,
    Action(Arc<dyn TaskAction>),
    /// Run a fixed sequence of positions.
    Sequence(Sequence),
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Group => f.write_str("Group"),
            TaskBody::Action(_) => f.write_str("Action(..)"),
            TaskBody::Sequence(seq) => f.debug_tuple("Sequence").field(seq).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    name: TaskName,
    prereqs: Vec<TaskName>,
    body: TaskBody,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prereqs(&self) -> &[TaskName] {
        &self.prereqs
    }

    pub fn body(&self) -> &TaskBody {
        &self.body
    }
}

/// Name -> task mapping. Immutable once handed to a [`Sequencer`].
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskName, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task with an action.
    pub fn register<A>(&mut self, name: &str, prereqs: &[&str], action: A) -> Result<()>
    where
        A: TaskAction + 'static,
    {
        self.insert(name, prereqs, TaskBody::Action(Arc::new(action)))
    }

    /// Register a task that only groups its prerequisites.
    pub fn register_group(&mut self, name: &str, prereqs: &[&str]) -> Result<()> {
        self.insert(name, prereqs, TaskBody::Group)
    }

    /// Register a task whose body runs `sequence`.
    pub fn register_sequence(
        &mut self,
        name: &str,
        prereqs: &[&str],
        sequence: Sequence,
    ) -> Result<()> {
        self.insert(name, prereqs, TaskBody::Sequence(sequence))
    }

    fn insert(&mut self, name: &str, prereqs: &[&str], body: TaskBody) -> Result<()> {
        if self.tasks.contains_key(name) {
            return Err(KitforgeError::config(format!(
                "task '{name}' is registered twice"
            )));
        }
        debug!(task = name, ?prereqs, ?body, "registering task");
        self.tasks.insert(
            name.to_string(),
            Task {
                name: name.to_string(),
                prereqs: prereqs.iter().map(|p| p.to_string()).collect(),
                body,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Task> {
        self.tasks
            .get(name)
            .ok_or_else(|| KitforgeError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// All tasks, sorted by name.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check the whole graph: every prerequisite and sequence reference
    /// resolves, and neither kind of edge closes a cycle.
    pub fn validate(&self) -> Result<()> {
        // Edge direction: dependency -> dependent. A task that runs a
        // sequence depends on every task named in it.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.tasks.keys() {
            graph.add_node(name.as_str());
        }

        for task in self.tasks.values() {
            let referenced = task.prereqs.iter().chain(match &task.body {
                TaskBody::Sequence(seq) => seq.task_names().collect::<Vec<_>>(),
                _ => Vec::new(),
            });

            for dep in referenced {
                if dep == &task.name {
                    return Err(KitforgeError::DagCycle(format!(
                        "task '{}' depends on itself",
                        task.name
                    )));
                }
                if !self.tasks.contains_key(dep) {
                    return Err(KitforgeError::UnknownTask(format!(
                        "{dep} (referenced by '{}')",
                        task.name
                    )));
                }
                graph.add_edge(dep.as_str(), task.name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(KitforgeError::DagCycle(format!(
                "cycle in task graph involving task '{}'",
                cycle.node_id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: TaskContext) -> Result<()> {
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg = TaskRegistry::new();
        reg.register("a", &[], noop).unwrap();
        assert!(reg.register_group("a", &[]).is_err());
    }

    #[test]
    fn unknown_prerequisite_fails_validation() {
        let mut reg = TaskRegistry::new();
        reg.register("a", &["missing"], noop).unwrap();
        let err = reg.validate().unwrap_err();
        assert!(matches!(err, KitforgeError::UnknownTask(ref m) if m.starts_with("missing")));
    }

    #[test]
    fn unknown_sequence_reference_fails_validation() {
        let mut reg = TaskRegistry::new();
        reg.register_sequence("build", &[], Sequence::new().then("nope"))
            .unwrap();
        assert!(matches!(reg.validate(), Err(KitforgeError::UnknownTask(_))));
    }

    #[test]
    fn cycles_are_detected_through_sequences() {
        let mut reg = TaskRegistry::new();
        reg.register_group("a", &["b"]).unwrap();
        reg.register_sequence("b", &[], Sequence::new().then("a")).unwrap();
        assert!(matches!(reg.validate(), Err(KitforgeError::DagCycle(_))));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut reg = TaskRegistry::new();
        reg.register_group("a", &["a"]).unwrap();
        assert!(matches!(reg.validate(), Err(KitforgeError::DagCycle(_))));
    }

    #[test]
    fn valid_graph_passes() {
        let mut reg = TaskRegistry::new();
        reg.register("leaf", &[], noop).unwrap();
        reg.register_group("group", &["leaf"]).unwrap();
        reg.register_sequence("top", &[], Sequence::new().then("leaf").then_parallel(["group"]))
            .unwrap();
        assert!(reg.validate().is_ok());
        assert_eq!(reg.len(), 3);
    }
}

// src/dag/scheduler.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::engine::{TaskName, TaskOutcome};

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    /// Triggered for this run, waiting on prerequisites.
    Pending,
    /// Dispatched to the executor.
    Running,
    DoneSuccess,
    /// Failed in this run, blocked by a failed prerequisite, or aborted
    /// before it was dispatched.
    DoneFailed,
}

#[derive(Debug, Clone)]
struct TaskInfo {
    name: TaskName,
    deps: Vec<TaskName>,

    /// Per-run state (None if not participating in the current run).
    run_state: Option<RunState>,

    /// Last run in which this task succeeded. A prerequisite that is not
    /// part of the current run counts as satisfied when this is set, which
    /// is what keeps a shared prerequisite from running twice in one
    /// invocation.
    last_successful_run: Option<u64>,

    last_failed_run: Option<u64>,
}

/// A task the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
}

/// Immutable prerequisite graph plus mutable per-run state.
///
/// One scheduler lives for one top-level position of a sequence. It:
/// - marks a triggered task and its unsettled prerequisite closure Pending
/// - hands out tasks whose prerequisites have all succeeded
/// - fails the dependents of a failed task
/// - can abort everything not yet dispatched
pub struct Scheduler {
    graph: Arc<DagGraph>,
    tasks: HashMap<TaskName, TaskInfo>,

    run_counter: u64,
    current_run_id: Option<u64>,
}

impl Scheduler {
    pub fn new(graph: Arc<DagGraph>) -> Self {
        let tasks = graph
            .tasks()
            .map(|name| {
                (
                    name.to_string(),
                    TaskInfo {
                        name: name.to_string(),
                        deps: graph.dependencies_of(name).to_vec(),
                        run_state: None,
                        last_successful_run: None,
                        last_failed_run: None,
                    },
                )
            })
            .collect();

        Self {
            graph,
            tasks,
            run_counter: 0,
            current_run_id: None,
        }
    }

    /// Record tasks that already succeeded earlier in the same invocation.
    pub fn with_history<'a>(mut self, succeeded: impl IntoIterator<Item = &'a str>) -> Self {
        for name in succeeded {
            if let Some(info) = self.tasks.get_mut(name) {
                info.last_successful_run = Some(0);
            }
        }
        self
    }

    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    /// Start a new run, resetting per-run state but keeping success history.
    pub fn start_new_run(&mut self) {
        self.run_counter += 1;
        self.current_run_id = Some(self.run_counter);

        for info in self.tasks.values_mut() {
            info.run_state = None;
        }

        debug!(run_id = self.run_counter, "scheduler: starting new run");
    }

    /// Trigger a single task. See [`Scheduler::handle_triggers`].
    pub fn handle_trigger(&mut self, task: &str) -> Vec<ScheduledTask> {
        self.handle_triggers([task])
    }

    /// Mark the given tasks, plus every prerequisite that has not already
    /// succeeded, Pending for this run. Tasks that already succeeded are
    /// skipped. Returns the tasks that are ready right away.
    pub fn handle_triggers<'a>(
        &mut self,
        triggers: impl IntoIterator<Item = &'a str>,
    ) -> Vec<ScheduledTask> {
        if self.current_run_id.is_none() {
            warn!("handle_triggers called with no active run; implicitly starting a new run");
            self.start_new_run();
        }

        for task in triggers {
            if !self.graph.contains(task) {
                warn!(task = %task, "trigger for unknown task; ignoring");
                continue;
            }
            self.mark_pending(task);
        }

        let ready = self.collect_new_ready_tasks();
        self.maybe_finish_run();
        ready
    }

    fn mark_pending(&mut self, root: &str) {
        let mut stack = vec![root.to_string()];

        while let Some(name) = stack.pop() {
            let Some(info) = self.tasks.get_mut(&name) else {
                continue;
            };
            if info.run_state.is_some() {
                continue;
            }
            if info.last_successful_run.is_some() {
                debug!(task = %info.name, "already succeeded in this invocation; skipping");
                continue;
            }
            info.run_state = Some(RunState::Pending);
            debug!(task = %info.name, "task marked as Pending in this run");
            stack.extend(info.deps.iter().cloned());
        }
    }

    /// Handle the outcome of a dispatched task.
    ///
    /// - On success, dependents whose prerequisites are now all satisfied
    ///   become ready.
    /// - On failure, every Pending or Running dependent in this run is
    ///   marked failed.
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        let Some(run_id) = self.current_run_id else {
            warn!(task = %task, "handle_completion called with no active run; ignoring");
            return Vec::new();
        };

        let mut newly_ready = Vec::new();

        match self.tasks.get_mut(task) {
            Some(info) => match outcome {
                TaskOutcome::Success => {
                    info.run_state = Some(RunState::DoneSuccess);
                    info.last_successful_run = Some(run_id);
                    debug!(task = %info.name, "task completed successfully");
                    newly_ready.extend(self.collect_new_ready_tasks());
                }
                TaskOutcome::Failed(message) => {
                    info.run_state = Some(RunState::DoneFailed);
                    info.last_failed_run = Some(run_id);
                    warn!(
                        task = %info.name,
                        error = %message,
                        "task failed; failing dependents in this run"
                    );
                    self.mark_dependents_failed(task);
                }
            },
            None => warn!(task = %task, "completion for unknown task; ignoring"),
        }

        self.maybe_finish_run();
        newly_ready
    }

    /// Fail every task that is still Pending so nothing new gets dispatched.
    /// Running tasks are left alone; the run finishes once they report back.
    pub fn abort_pending(&mut self) -> usize {
        let mut aborted = 0;
        for info in self.tasks.values_mut() {
            if info.run_state == Some(RunState::Pending) {
                info.run_state = Some(RunState::DoneFailed);
                aborted += 1;
            }
        }
        if aborted > 0 {
            debug!(aborted, "aborted pending tasks");
        }
        self.maybe_finish_run();
        aborted
    }

    /// Whether `task` failed in the most recent run.
    pub fn failed_in_last_run(&self, task: &str) -> bool {
        self.tasks
            .get(task)
            .is_some_and(|info| info.last_failed_run == Some(self.run_counter))
    }

    fn maybe_finish_run(&mut self) {
        if self.current_run_id.is_none() {
            return;
        }

        let any_active = self.tasks.values().any(|info| {
            matches!(
                info.run_state,
                Some(RunState::Pending) | Some(RunState::Running)
            )
        });

        if !any_active {
            info!(run_id = self.current_run_id, "scheduler: all tasks settled");
            self.current_run_id = None;
        }
    }

    /// Move Pending tasks with satisfied prerequisites to Running.
    fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let mut candidates: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| {
                matches!(info.run_state, Some(RunState::Pending)) && self.deps_satisfied(info)
            })
            .map(|info| info.name.clone())
            .collect();
        candidates.sort();

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                debug!(task = %info.name, "prerequisites satisfied; marking Running");
                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask { name });
            }
        }
        ready
    }

    /// A prerequisite is satisfied when it succeeded in this run, or is not
    /// part of this run but succeeded earlier.
    fn deps_satisfied(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.tasks.get(dep_name) {
            Some(dep) => match dep.run_state {
                Some(RunState::DoneSuccess) => true,
                Some(_) => false,
                None => dep.last_successful_run.is_some(),
            },
            None => {
                warn!(task = %info.name, dep = %dep_name, "dependency missing from tasks map");
                false
            }
        })
    }

    fn mark_dependents_failed(&mut self, failed_task: &str) {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();

        while let Some(name) = stack.pop() {
            if let Some(info) = self.tasks.get_mut(&name) {
                if matches!(
                    info.run_state,
                    Some(RunState::Pending) | Some(RunState::Running)
                ) {
                    info.run_state = Some(RunState::DoneFailed);
                    debug!(task = %info.name, "marking dependent as DoneFailed due to upstream failure");
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
            }
        }
    }
}

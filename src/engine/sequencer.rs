// src/engine/sequencer.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::context::BuildContext;
use crate::dag::{DagGraph, ScheduledTask, Scheduler};
use crate::engine::{TaskName, TaskOutcome};
use crate::errors::{KitforgeError, Result};
use crate::exec::{TaskCompletion, spawn_executor};
use crate::session::Session;
use crate::task::TaskRegistry;

/// Ordered positions; the tasks inside one position run concurrently.
///
/// ```
/// use kitforge::engine::Sequence;
///
/// let build = Sequence::new()
///     .then("build:clean")
///     .then_parallel(["style", "build:babel", "build:pack", "build:pack:jq"]);
/// assert_eq!(build.positions().len(), 2);
/// assert_eq!(build.to_string(), "build:clean -> [style, build:babel, build:pack, build:pack:jq]");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    positions: Vec<Vec<TaskName>>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// A one-position sequence running all `tasks` side by side.
    pub fn parallel<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        Self::new().then_parallel(tasks)
    }

    /// Append a position holding a single task.
    pub fn then(mut self, task: impl Into<TaskName>) -> Self {
        self.positions.push(vec![task.into()]);
        self
    }

    /// Append a position of tasks that run concurrently.
    pub fn then_parallel<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        let group: Vec<TaskName> = tasks.into_iter().map(Into::into).collect();
        if !group.is_empty() {
            self.positions.push(group);
        }
        self
    }

    pub fn positions(&self) -> &[Vec<TaskName>] {
        &self.positions
    }

    /// Every task named anywhere in the sequence.
    pub fn task_names(&self) -> impl Iterator<Item = &TaskName> {
        self.positions.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .positions
            .iter()
            .map(|group| match group.as_slice() {
                [single] => single.clone(),
                many => format!("[{}]", many.join(", ")),
            })
            .collect();
        f.write_str(&parts.join(" -> "))
    }
}

/// Outcome of a task run, published to everyone waiting on it.
type RunSlot = watch::Receiver<Option<TaskOutcome>>;

/// What the executor should do with a dispatched task.
#[derive(Debug)]
pub enum Claim {
    /// First request in this invocation: run the body, then publish.
    Run(watch::Sender<Option<TaskOutcome>>),
    /// Already started elsewhere in this invocation: wait for its outcome.
    Join(RunSlot),
}

/// Runs sequences against the task registry.
///
/// A `Sequencer` value stands for one top-level invocation. Every task body
/// runs at most once per invocation, including when nested sequences running
/// side by side share a task: the second request waits for the first run.
/// Tasks that succeeded are also remembered as scheduler history, so later
/// positions skip them. Use [`Sequencer::fresh_invocation`] to start over,
/// as the watch loop does for every rebuild.
#[derive(Clone)]
pub struct Sequencer {
    registry: Arc<TaskRegistry>,
    graph: Arc<DagGraph>,
    build: Arc<BuildContext>,
    session: Session,
    completed: Arc<Mutex<HashSet<TaskName>>>,
    runs: Arc<Mutex<HashMap<TaskName, RunSlot>>>,
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("tasks", &self.registry.len())
            .field("completed", &self.completed())
            .finish_non_exhaustive()
    }
}

impl Sequencer {
    pub fn new(registry: Arc<TaskRegistry>, build: Arc<BuildContext>, session: Session) -> Self {
        let graph = Arc::new(DagGraph::from_registry(&registry));
        Self {
            registry,
            graph,
            build,
            session,
            completed: Arc::new(Mutex::new(HashSet::new())),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn build(&self) -> &BuildContext {
        &self.build
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Same registry, context and session with an empty history.
    pub fn fresh_invocation(&self) -> Self {
        Self {
            completed: Arc::new(Mutex::new(HashSet::new())),
            runs: Arc::new(Mutex::new(HashMap::new())),
            ..self.clone()
        }
    }

    /// Claim `task` for this invocation. Only the first caller gets
    /// [`Claim::Run`]; the slot stays in place after the run, so late
    /// callers get the recorded outcome.
    pub fn claim(&self, task: &str) -> Claim {
        let mut runs = self
            .runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(slot) = runs.get(task) {
            return Claim::Join(slot.clone());
        }
        let (tx, rx) = watch::channel(None);
        runs.insert(task.to_string(), rx);
        Claim::Run(tx)
    }

    /// Tasks that succeeded in this invocation, sorted.
    pub fn completed(&self) -> Vec<TaskName> {
        let mut names: Vec<TaskName> = self.lock_completed().iter().cloned().collect();
        names.sort();
        names
    }

    fn lock_completed(&self) -> std::sync::MutexGuard<'_, HashSet<TaskName>> {
        self.completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run every position in order. A failing position stops the sequence;
    /// later positions never start.
    pub async fn run(&self, sequence: &Sequence) -> Result<()> {
        for (index, group) in sequence.positions().iter().enumerate() {
            info!(position = index, tasks = ?group, "starting sequence position");
            self.run_tasks(group).await?;
        }
        Ok(())
    }

    /// Run one position: `tasks` and their prerequisites, concurrently where
    /// the graph allows.
    ///
    /// The first failure is logged as soon as it arrives and nothing else is
    /// dispatched after it. The error itself is returned only once the
    /// position has drained: tasks already running are awaited and their
    /// results dropped.
    pub async fn run_tasks(&self, tasks: &[TaskName]) -> Result<()> {
        for name in tasks {
            self.registry.get(name)?;
        }

        let history = self.completed();
        let mut scheduler = Scheduler::new(Arc::clone(&self.graph))
            .with_history(history.iter().map(String::as_str));
        scheduler.start_new_run();

        let (done_tx, mut done_rx) = mpsc::channel::<TaskCompletion>(32);
        let exec_tx = spawn_executor(self.clone(), done_tx);

        let ready = scheduler.handle_triggers(tasks.iter().map(String::as_str));
        dispatch(&exec_tx, ready).await?;

        let mut first_error: Option<(TaskName, KitforgeError)> = None;

        while !scheduler.is_idle() {
            let Some(TaskCompletion { task, result }) = done_rx.recv().await else {
                return Err(KitforgeError::Other(anyhow!(
                    "executor stopped before the position settled"
                )));
            };

            let outcome = match result {
                Ok(()) => {
                    if first_error.is_none() {
                        self.lock_completed().insert(task.clone());
                    } else {
                        debug!(task = %task, "discarding success after earlier failure");
                    }
                    TaskOutcome::Success
                }
                Err(err) => {
                    let message = err.to_string();
                    if first_error.is_none() {
                        error!(task = %task, error = %message, "task failed; not starting anything else");
                        let aborted = scheduler.abort_pending();
                        debug!(aborted, "pending tasks dropped after failure");
                        first_error = Some((task.clone(), err));
                    } else {
                        debug!(task = %task, error = %message, "discarding result after earlier failure");
                    }
                    TaskOutcome::Failed(message)
                }
            };

            let ready = scheduler.handle_completion(&task, outcome);
            if first_error.is_none() {
                dispatch(&exec_tx, ready).await?;
            }
        }

        match first_error {
            Some((task, err)) => Err(task_error(task, err)),
            None => Ok(()),
        }
    }
}

async fn dispatch(exec_tx: &mpsc::Sender<ScheduledTask>, tasks: Vec<ScheduledTask>) -> Result<()> {
    for task in tasks {
        debug!(task = %task.name, "dispatching task to executor");
        exec_tx
            .send(task)
            .await
            .map_err(|e| KitforgeError::Other(anyhow!("executor channel closed: {e}")))?;
    }
    Ok(())
}

/// Attach the failing task's name, once.
fn task_error(task: TaskName, err: KitforgeError) -> KitforgeError {
    match err {
        already @ KitforgeError::TaskFailed { .. } => already,
        other => KitforgeError::TaskFailed {
            task,
            message: other.to_string(),
        },
    }
}

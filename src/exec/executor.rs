// src/exec/executor.rs

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{Claim, Sequencer, TaskName, TaskOutcome};
use crate::errors::{KitforgeError, Result};
use crate::task::{TaskBody, TaskContext};

/// Reported back to the sequencer once a task body has returned.
#[derive(Debug)]
pub struct TaskCompletion {
    pub task: TaskName,
    pub result: Result<()>,
}

/// Spawn the executor loop for one sequence position.
///
/// Every scheduled task runs in its own tokio task, so independent tasks of
/// a parallel group overlap. The loop ends when the returned sender is
/// dropped.
pub fn spawn_executor(
    sequencer: Sequencer,
    completion_tx: mpsc::Sender<TaskCompletion>,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        debug!("executor loop started");
        while let Some(task) = rx.recv().await {
            let sequencer = sequencer.clone();
            let completion_tx = completion_tx.clone();
            tokio::spawn(async move {
                run_task(task, sequencer, completion_tx).await;
            });
        }
        debug!("executor loop finished (channel closed)");
    });

    tx
}

async fn run_task(
    task: ScheduledTask,
    sequencer: Sequencer,
    completion_tx: mpsc::Sender<TaskCompletion>,
) {
    let name = task.name;
    let started = Instant::now();
    info!(task = %name, "starting task");

    // A panicking body surfaces as a JoinError instead of tearing down the
    // executor.
    let result = match tokio::spawn(execute(name.clone(), sequencer)).await {
        Ok(result) => result,
        Err(join_err) => Err(KitforgeError::TaskFailed {
            task: name.clone(),
            message: format!("task aborted: {join_err}"),
        }),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => info!(task = %name, elapsed_ms, "finished task"),
        Err(err) => error!(task = %name, elapsed_ms, error = %err, "task failed"),
    }

    if completion_tx
        .send(TaskCompletion { task: name, result })
        .await
        .is_err()
    {
        warn!("sequencer stopped listening; dropping task completion");
    }
}

/// Run a task's body, without its prerequisites.
///
/// If the task was already claimed in this invocation, the body is not run
/// again; the caller shares the first run's outcome.
pub async fn execute(name: TaskName, sequencer: Sequencer) -> Result<()> {
    match sequencer.claim(&name) {
        Claim::Run(slot) => {
            let result = run_body(&name, &sequencer).await;
            let outcome = match &result {
                Ok(()) => TaskOutcome::Success,
                Err(err) => TaskOutcome::Failed(err.to_string()),
            };
            slot.send_replace(Some(outcome));
            result
        }
        Claim::Join(mut slot) => {
            debug!(task = %name, "already claimed in this invocation; waiting for its outcome");
            let outcome = slot
                .wait_for(Option::is_some)
                .await
                .map(|published| (*published).clone())
                .ok()
                .flatten();
            match outcome {
                Some(TaskOutcome::Success) => Ok(()),
                Some(TaskOutcome::Failed(message)) => Err(KitforgeError::TaskFailed {
                    task: name,
                    message,
                }),
                None => Err(KitforgeError::TaskFailed {
                    task: name,
                    message: "the run this task was waiting on was aborted".to_string(),
                }),
            }
        }
    }
}

async fn run_body(name: &TaskName, sequencer: &Sequencer) -> Result<()> {
    let registry = Arc::clone(sequencer.registry());
    let task = registry.get(name)?;

    match task.body() {
        TaskBody::Group => Ok(()),
        TaskBody::Action(action) => {
            action
                .run(TaskContext::new(name.clone(), sequencer.clone()))
                .await
        }
        TaskBody::Sequence(sequence) => {
            info!(task = %name, sequence = %sequence, "running nested sequence");
            sequencer.run(sequence).await
        }
    }
}

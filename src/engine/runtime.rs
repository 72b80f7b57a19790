// src/engine/runtime.rs

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::queue::TriggerQueue;
use crate::engine::{Sequencer, TaskName, TaskOutcome};
use crate::errors::Result;
use crate::session::{HmrEvent, HmrHub};

/// Reason why a task was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    FileWatch,
}

/// Events consumed by the watch runtime.
///
/// - the file watcher sends `TaskTriggered`
/// - the rebuild task sends `RebuildFinished`
/// - shutdown handling sends `ShutdownRequested`
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    TaskTriggered {
        task: TaskName,
        reason: TriggerReason,
    },
    RebuildFinished {
        tasks: Vec<TaskName>,
        outcome: TaskOutcome,
    },
    ShutdownRequested,
}

/// The watch loop.
///
/// Rebuilds are serialized: at most one runs at a time, and triggers that
/// arrive meanwhile go through the [`TriggerQueue`]. Each rebuild is a fresh
/// invocation of the sequencer, so the bound task and its prerequisites run
/// again. A failed rebuild is logged and the loop keeps watching.
pub struct Runtime {
    sequencer: Sequencer,
    queue: TriggerQueue,
    hub: HmrHub,
    events_tx: mpsc::Sender<RuntimeEvent>,
    events_rx: mpsc::Receiver<RuntimeEvent>,
    rebuilding: bool,
}

impl Runtime {
    /// `events_tx` must be the sender paired with `events_rx`; rebuild
    /// completions are reported through it.
    pub fn new(
        sequencer: Sequencer,
        queue: TriggerQueue,
        events_tx: mpsc::Sender<RuntimeEvent>,
        events_rx: mpsc::Receiver<RuntimeEvent>,
    ) -> Self {
        let hub = sequencer.session().hmr().clone();
        Self {
            sequencer,
            queue,
            hub,
            events_tx,
            events_rx,
            rebuilding: false,
        }
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding
    }

    pub async fn run(mut self) -> Result<()> {
        info!("watch runtime started");

        while let Some(event) = self.events_rx.recv().await {
            debug!(?event, "runtime received event");

            match event {
                RuntimeEvent::TaskTriggered { task, reason } => self.handle_task_trigger(task, reason),
                RuntimeEvent::RebuildFinished { tasks, outcome } => {
                    self.handle_rebuild_finished(tasks, outcome)
                }
                RuntimeEvent::ShutdownRequested => {
                    info!("shutdown requested, stopping watch runtime");
                    break;
                }
            }
        }

        info!("watch runtime exiting");
        Ok(())
    }

    fn handle_task_trigger(&mut self, task: TaskName, reason: TriggerReason) {
        info!(task = %task, ?reason, "task triggered");

        if self.rebuilding {
            self.queue.record_trigger(&task);
            debug!(task = %task, "rebuild in progress; trigger queued");
            return;
        }

        let mut triggers = self.queue.drain_pending();
        if !triggers.contains(&task) {
            triggers.push(task);
        }
        self.start_rebuild(triggers);
    }

    fn handle_rebuild_finished(&mut self, tasks: Vec<TaskName>, outcome: TaskOutcome) {
        self.rebuilding = false;

        match outcome {
            TaskOutcome::Success => {
                info!(tasks = ?tasks, "rebuild finished");
                self.hub.publish(HmrEvent::reload(tasks));
            }
            TaskOutcome::Failed(message) => {
                error!(tasks = ?tasks, error = %message, "rebuild failed; still watching");
                self.hub.publish(HmrEvent::Error { message });
            }
        }

        let queued = self.queue.drain_pending();
        if !queued.is_empty() {
            self.start_rebuild(queued);
        }
    }

    fn start_rebuild(&mut self, tasks: Vec<TaskName>) {
        if tasks.is_empty() {
            return;
        }

        info!(tasks = ?tasks, "starting rebuild");
        self.rebuilding = true;
        self.hub.publish(HmrEvent::Building {
            tasks: tasks.clone(),
        });

        let sequencer = self.sequencer.fresh_invocation();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = match sequencer.run_tasks(&tasks).await {
                Ok(()) => TaskOutcome::Success,
                Err(err) => TaskOutcome::Failed(err.to_string()),
            };
            if events_tx
                .send(RuntimeEvent::RebuildFinished { tasks, outcome })
                .await
                .is_err()
            {
                debug!("watch runtime gone; dropping rebuild result");
            }
        });
    }
}

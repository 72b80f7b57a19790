// src/engine/queue.rs

use std::collections::{BTreeSet, VecDeque};
use std::str::FromStr;

use tracing::{debug, warn};

use super::TaskName;

/// What to do with a watch trigger that arrives while a rebuild is running.
///
/// - `Queue`: coalesce it into the pending batch and rebuild once the
///   current rebuild settles.
/// - `Cancel`: forget whatever was pending and keep only this trigger.
///   The running rebuild itself always completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerWhileRunningBehaviour {
    #[default]
    Queue,
    Cancel,
}

impl FromStr for TriggerWhileRunningBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(TriggerWhileRunningBehaviour::Queue),
            "cancel" => Ok(TriggerWhileRunningBehaviour::Cancel),
            other => Err(format!(
                "invalid triggered_while_running_behaviour: {other} (expected \"queue\" or \"cancel\")"
            )),
        }
    }
}

/// Rebuild batches waiting for the current rebuild to finish.
///
/// With the default `max_runs = 1` every trigger received during a rebuild
/// lands in the same batch, so a burst of saves produces exactly one
/// follow-up rebuild.
#[derive(Debug)]
pub struct TriggerQueue {
    behaviour: TriggerWhileRunningBehaviour,
    max_runs: usize,
    runs: VecDeque<BTreeSet<TaskName>>,
}

impl TriggerQueue {
    /// `max_runs` is clamped to at least 1.
    pub fn new(behaviour: TriggerWhileRunningBehaviour, max_runs: usize) -> Self {
        Self {
            behaviour,
            max_runs: max_runs.max(1),
            runs: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn behaviour(&self) -> TriggerWhileRunningBehaviour {
        self.behaviour
    }

    /// Number of queued batches.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn record_trigger(&mut self, task: &str) {
        match self.behaviour {
            TriggerWhileRunningBehaviour::Queue => {
                match self.runs.back_mut() {
                    Some(batch) => {
                        let inserted = batch.insert(task.to_string());
                        debug!(task, inserted, "merged trigger into queued batch");
                    }
                    None => {
                        self.runs.push_back(BTreeSet::from([task.to_string()]));
                        debug!(task, "queued first rebuild batch");
                    }
                }

                if self.runs.len() > self.max_runs {
                    warn!(
                        batches = self.runs.len(),
                        max_runs = self.max_runs,
                        "too many queued rebuilds; dropping the oldest"
                    );
                    while self.runs.len() > self.max_runs {
                        self.runs.pop_front();
                    }
                }
            }
            TriggerWhileRunningBehaviour::Cancel => {
                debug!(task, "replacing queued rebuilds with this trigger");
                self.runs.clear();
                self.runs.push_back(BTreeSet::from([task.to_string()]));
            }
        }
    }

    /// Merge every queued batch into one sorted list of task names.
    pub fn drain_pending(&mut self) -> Vec<TaskName> {
        let merged: BTreeSet<TaskName> = self.runs.drain(..).flatten().collect();
        debug!(drained = merged.len(), "drained queued triggers");
        merged.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_mode_coalesces_into_one_batch() {
        let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 1);
        q.record_trigger("style:scss");
        q.record_trigger("jq:md2json");
        q.record_trigger("style:scss");
        assert_eq!(q.len(), 1);
        assert_eq!(q.drain_pending(), vec!["jq:md2json", "style:scss"]);
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_mode_keeps_only_latest() {
        let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Cancel, 3);
        q.record_trigger("style:scss");
        q.record_trigger("jq:md2json");
        assert_eq!(q.drain_pending(), vec!["jq:md2json"]);
    }

    #[test]
    fn zero_length_is_clamped() {
        let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 0);
        q.record_trigger("a");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn behaviour_parses_case_insensitively() {
        assert_eq!(
            " Cancel ".parse::<TriggerWhileRunningBehaviour>(),
            Ok(TriggerWhileRunningBehaviour::Cancel)
        );
        assert!("race".parse::<TriggerWhileRunningBehaviour>().is_err());
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kitforge::errors::KitforgeError;
use kitforge::task::{TaskAction, TaskContext};

/// Shared log of task starts and ends.
///
/// Actions produced by a recorder push `start:<task>` when they begin and
/// `end:<task>` (or `fail:<task>`) when they settle.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// How many times `event` was recorded.
    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// Succeeds after `delay`.
    pub fn action(&self, delay: Duration) -> impl TaskAction + 'static {
        let events = Arc::clone(&self.events);
        move |ctx: TaskContext| {
            let events = Arc::clone(&events);
            async move {
                push(&events, format!("start:{}", ctx.task()));
                tokio::time::sleep(delay).await;
                push(&events, format!("end:{}", ctx.task()));
                Ok::<(), KitforgeError>(())
            }
        }
    }

    /// Fails with `message` after `delay`.
    pub fn failing(&self, delay: Duration, message: &'static str) -> impl TaskAction + 'static {
        let events = Arc::clone(&self.events);
        move |ctx: TaskContext| {
            let events = Arc::clone(&events);
            async move {
                push(&events, format!("start:{}", ctx.task()));
                tokio::time::sleep(delay).await;
                push(&events, format!("fail:{}", ctx.task()));
                Err::<(), KitforgeError>(KitforgeError::config(message))
            }
        }
    }
}

fn push(events: &Mutex<Vec<String>>, event: String) {
    events.lock().unwrap().push(event);
}

// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{RuntimeEvent, TriggerReason};
use crate::errors::{KitforgeError, Result};
use crate::watch::patterns::TaskWatchProfile;

/// Keeps the underlying `RecommendedWatcher` alive; dropping it stops
/// watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `root` recursively and send one `TaskTriggered` per matching
/// profile and notify event.
///
/// Only content changes count (create, modify, remove); access events are
/// ignored since every build reads the very files being watched.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    profiles: Vec<TaskWatchProfile>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);
    let profiles = Arc::new(profiles);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("watch consumer gone; dropping notify event");
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .map_err(|e| KitforgeError::Other(e.into()))?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| KitforgeError::Other(e.into()))?;

    info!(root = %root.display(), profiles = profiles.len(), "file watcher started");

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !is_content_change(&event.kind) {
                continue;
            }
            debug!(?event, "received notify event");

            for task in matching_tasks(&root, &profiles, &event.paths) {
                debug!(task = %task, "watch match -> triggering task");
                let sent = runtime_tx
                    .send(RuntimeEvent::TaskTriggered {
                        task,
                        reason: TriggerReason::FileWatch,
                    })
                    .await;
                if sent.is_err() {
                    debug!("runtime channel closed; stopping watcher loop");
                    return;
                }
            }
        }

        debug!("file watcher loop ended");
    });

    Ok(WatcherHandle { _inner: watcher })
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Distinct task names whose profile matches any of `paths`.
fn matching_tasks(root: &Path, profiles: &[TaskWatchProfile], paths: &[PathBuf]) -> BTreeSet<String> {
    let mut tasks = BTreeSet::new();
    for path in paths {
        let Some(rel) = relative_str(root, path) else {
            warn!(path = %path.display(), root = %root.display(), "could not relativize path");
            continue;
        };
        for profile in profiles {
            if profile.matches(&rel) {
                tasks.insert(profile.name().to_string());
            }
        }
    }
    tasks
}

/// `path` relative to `root`, with forward slashes.
fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_trigger_per_task_per_event() {
        let profiles = vec![
            TaskWatchProfile::new("style:scss", vec!["scss/**/*.scss".into()]).unwrap(),
            TaskWatchProfile::new("jq:md2json", vec!["docs/jq/*.md".into()]).unwrap(),
        ];
        let root = Path::new("/proj");
        let tasks = matching_tasks(
            root,
            &profiles,
            &[
                PathBuf::from("/proj/scss/a.scss"),
                PathBuf::from("/proj/scss/b/c.scss"),
                PathBuf::from("/elsewhere/x.md"),
            ],
        );
        assert_eq!(tasks.into_iter().collect::<Vec<_>>(), vec!["style:scss"]);
    }

    #[test]
    fn access_events_are_ignored() {
        use notify::event::{AccessKind, CreateKind};
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
    }
}

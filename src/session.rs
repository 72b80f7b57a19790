// src/session.rs

//! Long-lived services started by tasks.
//!
//! `server` and `watch` finish as tasks as soon as their service is up, so
//! a sequence such as `docs` can settle. The services themselves are owned
//! by the [`Session`] and keep the process alive until Ctrl-C or until one
//! of them stops.

use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::TaskName;
use crate::errors::{KitforgeError, Result};

/// Message pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum HmrEvent {
    /// A rebuild started.
    Building { tasks: Vec<TaskName> },
    /// Outputs changed. With `css_only` the client swaps stylesheets
    /// instead of reloading the page.
    Reload { tasks: Vec<TaskName>, css_only: bool },
    /// A rebuild failed; the previous outputs are still being served.
    Error { message: String },
}

impl HmrEvent {
    pub fn reload(tasks: Vec<TaskName>) -> Self {
        let css_only = !tasks.is_empty() && tasks.iter().all(|t| t.starts_with("style"));
        HmrEvent::Reload { tasks, css_only }
    }
}

/// Fan-out of [`HmrEvent`]s to every websocket client.
#[derive(Debug, Clone)]
pub struct HmrHub {
    tx: broadcast::Sender<HmrEvent>,
}

impl Default for HmrHub {
    fn default() -> Self {
        Self::new(16)
    }
}

impl HmrHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HmrEvent> {
        self.tx.subscribe()
    }

    /// Returns how many clients received the event.
    pub fn publish(&self, event: HmrEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!("no hot-reload clients connected");
                0
            }
        }
    }
}

#[derive(Default)]
struct SessionInner {
    services: Mutex<JoinSet<(String, Result<()>)>>,
    names: Mutex<Vec<String>>,
    hmr: HmrHub,
}

/// Shared by every task of a process run.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("services", &self.service_names())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hmr(&self) -> &HmrHub {
        &self.inner.hmr
    }

    /// Start a service that runs until it returns or the session ends.
    pub fn spawn_service<F>(&self, name: &str, service: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        info!(service = name, "starting service");
        let owned = name.to_string();
        lock(&self.inner.services).spawn(async move { (owned, service.await) });
        lock(&self.inner.names).push(name.to_string());
    }

    pub fn has_services(&self) -> bool {
        !lock(&self.inner.names).is_empty()
    }

    pub fn service_names(&self) -> Vec<String> {
        lock(&self.inner.names).clone()
    }

    /// Wait for Ctrl-C, or for every service to stop. A service that fails
    /// ends the wait with its error; the others are aborted.
    pub async fn wait(&self) -> Result<()> {
        let mut services = std::mem::take(&mut *lock(&self.inner.services));
        if services.is_empty() {
            return Ok(());
        }

        info!(services = ?self.service_names(), "services running; press Ctrl-C to stop");

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for Ctrl-C");
                }
            }
            res = join_services(&mut services) => return res,
        }

        info!("shutdown requested, stopping services");
        services.shutdown().await;
        Ok(())
    }
}

async fn join_services(services: &mut JoinSet<(String, Result<()>)>) -> Result<()> {
    while let Some(joined) = services.join_next().await {
        match joined {
            Ok((name, Ok(()))) => info!(service = %name, "service stopped"),
            Ok((name, Err(err))) => {
                error!(service = %name, error = %err, "service failed");
                return Err(err);
            }
            Err(join_err) => {
                return Err(KitforgeError::Other(anyhow::anyhow!(
                    "service task aborted: {join_err}"
                )));
            }
        }
    }
    Ok(())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_is_css_only_for_style_tasks() {
        assert_eq!(
            HmrEvent::reload(vec!["style:scss".into()]),
            HmrEvent::Reload {
                tasks: vec!["style:scss".into()],
                css_only: true
            }
        );
        assert!(matches!(
            HmrEvent::reload(vec!["style:scss".into(), "jq:md2json".into()]),
            HmrEvent::Reload { css_only: false, .. }
        ));
    }

    #[test]
    fn events_serialize_with_action_tag() {
        let json = serde_json::to_string(&HmrEvent::Error {
            message: "x".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"action":"error","message":"x"}"#);
    }

    #[tokio::test]
    async fn wait_returns_immediately_without_services() {
        let session = Session::new();
        assert!(!session.has_services());
        session.wait().await.unwrap();
    }

    #[tokio::test]
    async fn wait_returns_when_services_finish() {
        let session = Session::new();
        session.spawn_service("short", async { Ok(()) });
        assert!(session.has_services());
        session.wait().await.unwrap();
    }

    #[tokio::test]
    async fn failing_service_ends_wait_with_error() {
        let session = Session::new();
        session.spawn_service("bad", async { Err(KitforgeError::config("port in use")) });
        assert!(session.wait().await.is_err());
    }

    #[tokio::test]
    async fn hub_delivers_to_subscribers() {
        let hub = HmrHub::default();
        let mut rx = hub.subscribe();
        assert_eq!(hub.publish(HmrEvent::reload(vec!["jq:md2json".into()])), 1);
        assert!(matches!(rx.recv().await.unwrap(), HmrEvent::Reload { .. }));
    }
}

// src/server.rs

//! Documentation dev server.
//!
//! Static files come from the docs output first and the distribution root
//! second. Two middlewares sit in front of them:
//! - the dev bundle middleware answers `public_path + bundle_name` with an
//!   in-memory bundle of the docs entry, rebuilt on the first request after
//!   a script change;
//! - the hot-reload middleware injects the client script into HTML pages.
//!
//! Connected pages listen on a websocket for [`HmrEvent`]s.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, to_bytes};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use console::style;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::context::BuildContext;
use crate::engine::RuntimeEvent;
use crate::errors::{KitforgeError, Result};
use crate::pipeline::Bundle;
use crate::session::{HmrEvent, HmrHub};
use crate::watch::{TaskWatchProfile, WatcherHandle, spawn_watcher};

pub const HMR_WS_PATH: &str = "/__kitforge_hmr";
pub const HMR_SCRIPT_PATH: &str = "/__kitforge_hmr.js";

/// Largest HTML page the injection middleware will buffer.
const MAX_HTML_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub host: String,
    pub port: u16,
    /// Served first.
    pub docs_dist: PathBuf,
    /// Served when a file is not found under `docs_dist`.
    pub dist: PathBuf,
    /// URL of the in-memory dev bundle.
    pub bundle_url: String,
    pub log_prefix: String,
}

impl DevServerConfig {
    pub fn from_context(ctx: &BuildContext) -> Result<Self> {
        let server = &ctx.config.server;
        Ok(Self {
            host: server.host.clone(),
            port: server.port,
            docs_dist: ctx.paths.resolve("docs_dist")?,
            dist: ctx.paths.resolve("dist")?,
            bundle_url: bundle_url(&server.public_path, &server.bundle_name),
            log_prefix: server.log_prefix.clone(),
        })
    }
}

/// Join the public path and the bundle name with exactly one `/`.
pub fn bundle_url(public_path: &str, bundle_name: &str) -> String {
    format!("{}/{}", public_path.trim_end_matches('/'), bundle_name)
}

/// On-demand bundle of the docs entry, cached until invalidated.
pub struct DevBundler {
    bundle: Bundle,
    entry: PathBuf,
    prefix: String,
    cache: Mutex<Option<Arc<Vec<u8>>>>,
}

impl std::fmt::Debug for DevBundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevBundler")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

impl DevBundler {
    pub fn new(bundle: Bundle, entry: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            bundle,
            entry: entry.into(),
            prefix: prefix.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn from_context(ctx: &BuildContext) -> Result<Self> {
        let config = ctx.root.join(&ctx.config.bundle.docs_config);
        Ok(Self::new(
            Bundle::new(ctx.tools.bundler.clone(), config),
            ctx.paths.resolve("docs_entry")?,
            ctx.config.server.log_prefix.clone(),
        ))
    }

    /// Cached bundle, building it first if needed. Concurrent requests
    /// wait for a single build.
    pub async fn get(&self) -> Result<Arc<Vec<u8>>> {
        let mut cache = self.cache.lock().await;
        if let Some(bytes) = cache.as_ref() {
            return Ok(Arc::clone(bytes));
        }

        let started = Instant::now();
        match self.bundle.bundle_entry(&self.entry).await {
            Ok(bytes) => {
                print_stats(&self.prefix, &self.entry, bytes.len(), started);
                let bytes = Arc::new(bytes);
                *cache = Some(Arc::clone(&bytes));
                Ok(bytes)
            }
            Err(err) => {
                println!(
                    "[{}] {} {}",
                    style(&self.prefix).blue(),
                    style("bundle failed:").red().bold(),
                    err
                );
                Err(err)
            }
        }
    }

    pub async fn invalidate(&self) {
        if self.cache.lock().await.take().is_some() {
            debug!(entry = %self.entry.display(), "dev bundle invalidated");
        }
    }

    pub async fn is_cached(&self) -> bool {
        self.cache.lock().await.is_some()
    }
}

fn print_stats(prefix: &str, entry: &Path, bytes: usize, started: Instant) {
    println!(
        "[{}] {} {} {} {}",
        style(prefix).blue(),
        style("bundled").green().bold(),
        style(entry.display()).cyan(),
        style(format!("{:.1} KiB", bytes as f64 / 1024.0)).yellow(),
        style(format!("in {} ms", started.elapsed().as_millis())).dim(),
    );
}

struct ServerState {
    bundler: Arc<DevBundler>,
    hub: HmrHub,
    bundle_url: String,
}

/// Axum application for the dev server.
pub fn router(config: &DevServerConfig, bundler: Arc<DevBundler>, hub: HmrHub) -> Router {
    let state = Arc::new(ServerState {
        bundler,
        hub,
        bundle_url: config.bundle_url.clone(),
    });

    let statics = ServeDir::new(&config.docs_dist).fallback(ServeDir::new(&config.dist));

    Router::new()
        .route(HMR_WS_PATH, get(ws_handler))
        .route(HMR_SCRIPT_PATH, get(hmr_script_handler))
        .fallback_service(statics)
        .layer(middleware::from_fn(inject_hmr_client))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            dev_bundle_middleware,
        ))
        .with_state(state)
}

/// A listening dev server that has not started serving yet.
pub struct DevServer {
    listener: TcpListener,
    app: Router,
    addr: SocketAddr,
    prefix: String,
    watcher: Option<WatcherHandle>,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl DevServer {
    /// Bind the listening socket. Failing to bind is reported here, so the
    /// `server` task fails instead of a background service.
    pub async fn bind(config: &DevServerConfig, bundler: Arc<DevBundler>, hub: HmrHub) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                KitforgeError::config(format!(
                    "failed to bind dev server to {}:{}: {e}",
                    config.host, config.port
                ))
            })?;
        let addr = listener.local_addr()?;

        Ok(Self {
            listener,
            app: router(config, bundler, hub),
            addr,
            prefix: config.log_prefix.clone(),
            watcher: None,
        })
    }

    /// Keep `watcher` alive for as long as the server runs.
    pub fn with_watcher(mut self, watcher: WatcherHandle) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn serve(self) -> Result<()> {
        println!(
            "[{}] {} http://{}",
            style(&self.prefix).blue(),
            style("serving at").green(),
            self.addr
        );
        info!(addr = %self.addr, "dev server listening");

        let _watcher = self.watcher;
        axum::serve(self.listener, self.app).await?;
        Ok(())
    }
}

/// Watch the script sources behind the dev bundle; a change drops the
/// cached bundle and tells connected pages to reload.
pub fn watch_bundle_sources(
    ctx: &BuildContext,
    bundler: Arc<DevBundler>,
    hub: HmrHub,
) -> Result<WatcherHandle> {
    let mut patterns = ctx.paths.get("scripts")?.to_vec();
    let docs_entry = ctx.paths.get("docs_entry")?;
    for entry in docs_entry {
        let dir = Path::new(entry)
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        patterns.push(if dir.is_empty() {
            "*.{js,jsx}".to_string()
        } else {
            format!("{dir}/**/*.{{js,jsx}}")
        });
    }

    let profile = TaskWatchProfile::new("dev-bundle", patterns)?;
    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let handle = spawn_watcher(&ctx.root, vec![profile], tx)?;

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let RuntimeEvent::TaskTriggered { task, .. } = event {
                bundler.invalidate().await;
                hub.publish(HmrEvent::reload(vec![task]));
            }
        }
    });

    Ok(handle)
}

async fn dev_bundle_middleware(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET || request.uri().path() != state.bundle_url {
        return next.run(request).await;
    }

    match state.bundler.get().await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
            bytes.to_vec(),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "dev bundle failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn inject_hmr_client(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html || !response.status().is_success() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "could not buffer html response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script_tag(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Response::from_parts(parts, Body::from(html))
}

/// Insert the client script before `</body>`, or append it.
fn inject_script_tag(html: &str) -> String {
    let tag = format!(r#"<script src="{HMR_SCRIPT_PATH}"></script>"#);
    match html.rfind("</body>") {
        Some(pos) => format!("{}{tag}{}", &html[..pos], &html[pos..]),
        None => format!("{html}{tag}"),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| forward_events(socket, hub))
}

async fn forward_events(mut socket: WebSocket, hub: HmrHub) {
    let mut rx = hub.subscribe();
    debug!("hot-reload client connected");

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "hot-reload client lagged; forcing reload");
                HmrEvent::reload(Vec::new())
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "could not encode hot-reload event");
                continue;
            }
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }

    debug!("hot-reload client disconnected");
}

async fn hmr_script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        hmr_client_script(),
    )
}

/// Browser side of the hot-reload channel.
pub fn hmr_client_script() -> String {
    format!(
        r#"(function() {{
  'use strict';
  var url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{HMR_WS_PATH}';
  var ws = new WebSocket(url);

  function swapStylesheets() {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    Array.prototype.forEach.call(links, function(link) {{
      var href = link.href.replace(/[?&]_hmr=\d+/, '');
      link.href = href + (href.indexOf('?') === -1 ? '?' : '&') + '_hmr=' + Date.now();
    }});
  }}

  ws.onmessage = function(event) {{
    var msg = JSON.parse(event.data);
    switch (msg.action) {{
      case 'building':
        console.log('[kitforge] rebuilding', msg.tasks.join(', '));
        break;
      case 'reload':
        if (msg.css_only) {{ swapStylesheets(); }} else {{ location.reload(); }}
        break;
      case 'error':
        console.error('[kitforge]', msg.message);
        break;
    }}
  }};

  ws.onclose = function() {{
    setTimeout(function() {{ location.reload(); }}, 1000);
  }};
}})();
"#
    )
}

// src/lib.rs

pub mod banner;
pub mod builtin;
pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod env;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod package;
pub mod paths;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod task;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::context::BuildContext;
use crate::engine::{Sequence, Sequencer};
use crate::session::Session;
use crate::task::{TaskBody, TaskRegistry};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the build context (path table, package metadata, environment switch)
/// - the built-in task registry
/// - the sequencer running the requested tasks as one parallel position
/// - the session keeping the server and watch loop alive until Ctrl-C
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root = config_root_dir(&config_path);

    let build = BuildContext::load(&root, cfg)
        .with_context(|| format!("loading project at {}", root.display()))?;

    let registry = builtin::registry()?;
    builtin::validate_bindings(&build.config, &registry, &build.paths)?;
    for name in &args.tasks {
        registry.get(name)?;
    }

    let sequence = Sequence::parallel(args.tasks.iter().cloned());

    if args.dry_run {
        print_dry_run(&build, &registry, &sequence);
        return Ok(());
    }

    info!(mode = %build.mode, product = build.product(), %sequence, "starting");

    let session = Session::new();
    let sequencer = Sequencer::new(Arc::new(registry), Arc::new(build), session.clone());
    sequencer
        .run(&sequence)
        .await
        .with_context(|| format!("running {sequence}"))?;

    info!(completed = ?sequencer.completed(), "all tasks finished");

    session.wait().await?;
    Ok(())
}

/// Directory containing the config file, or `.`.
fn config_root_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Print mode, path table and task graph without running anything.
fn print_dry_run(build: &BuildContext, registry: &TaskRegistry, sequence: &Sequence) {
    println!("kitforge dry-run");
    println!("  mode = {}", build.mode);
    println!("  product = {}", build.product());
    println!("  version = {}", build.package.version);
    println!("  requested = {sequence}");
    println!();

    println!("paths:");
    for (role, locations) in build.paths.entries() {
        println!("  {role:<14} {}", locations.join(", "));
    }
    println!();

    println!("tasks ({}):", registry.len());
    for task in registry.tasks() {
        println!("  - {}", task.name());
        if !task.prereqs().is_empty() {
            println!("      prereqs: {:?}", task.prereqs());
        }
        if let TaskBody::Sequence(seq) = task.body() {
            println!("      sequence: {seq}");
        }
    }

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_config_name_means_current_dir() {
        assert_eq!(config_root_dir(Path::new("Kitforge.toml")), PathBuf::from("."));
        assert_eq!(
            config_root_dir(Path::new("site/Kitforge.toml")),
            PathBuf::from("site")
        );
    }
}

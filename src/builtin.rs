// src/builtin.rs

//! The operator-visible tasks.
//!
//! | task            | kind                                                      |
//! |-----------------|-----------------------------------------------------------|
//! | `clean`         | remove dist, docs output and lib                          |
//! | `build:clean`   | remove dist and lib                                       |
//! | `docs:clean`    | remove docs output                                        |
//! | `style:scss`    | style pipeline                                            |
//! | `style:fonts`   | font copy                                                 |
//! | `style`         | group of `style:scss` and `style:fonts`                   |
//! | `build:babel`   | transpile pipeline                                        |
//! | `build:pack`    | full bundle                                               |
//! | `build:pack:jq` | lite bundle                                               |
//! | `build`         | `build:clean -> [style, build:babel, build:pack, build:pack:jq]` |
//! | `watch`         | watch bindings, as a session service                      |
//! | `server`        | docs dev server, as a session service                     |
//! | `docs`          | `docs:clean -> docs:jq -> style -> server`                |
//! | `jq:md2json`    | markdown docs to JSON                                     |
//! | `docs:jq`       | group of `jq:md2json`                                     |
//! | `default`       | group of `docs` and `watch`                               |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::engine::{Runtime, RuntimeEvent, Sequence, TriggerQueue, TriggerWhileRunningBehaviour};
use crate::errors::{KitforgeError, Result};
use crate::paths::PathTable;
use crate::pipeline::presets::{self, BundleVariant};
use crate::server::{DevBundler, DevServer, DevServerConfig, watch_bundle_sources};
use crate::task::{TaskContext, TaskRegistry};
use crate::watch::{build_task_watch_profiles, spawn_watcher};

/// Every built-in task, validated.
pub fn registry() -> Result<TaskRegistry> {
    let mut registry = TaskRegistry::new();
    register_builtin(&mut registry)?;
    registry.validate()?;
    Ok(registry)
}

pub fn register_builtin(registry: &mut TaskRegistry) -> Result<()> {
    registry.register("clean", &[], clean)?;
    registry.register("build:clean", &[], build_clean)?;
    registry.register("docs:clean", &[], docs_clean)?;

    registry.register("style:scss", &[], style_scss)?;
    registry.register("style:fonts", &[], style_fonts)?;
    registry.register_group("style", &["style:scss", "style:fonts"])?;

    registry.register("build:babel", &[], build_babel)?;
    registry.register("build:pack", &[], build_pack)?;
    registry.register("build:pack:jq", &[], build_pack_jq)?;
    registry.register_sequence(
        "build",
        &[],
        Sequence::new()
            .then("build:clean")
            .then_parallel(["style", "build:babel", "build:pack", "build:pack:jq"]),
    )?;

    registry.register("watch", &[], watch)?;
    registry.register("server", &[], server)?;
    registry.register_sequence(
        "docs",
        &[],
        Sequence::new()
            .then("docs:clean")
            .then("docs:jq")
            .then("style")
            .then("server"),
    )?;

    registry.register("jq:md2json", &[], jq_md2json)?;
    registry.register_group("docs:jq", &["jq:md2json"])?;
    registry.register_group("default", &["docs", "watch"])?;

    Ok(())
}

/// Every effective watch binding must name a registered task and a known
/// path role.
pub fn validate_bindings(cfg: &ConfigFile, registry: &TaskRegistry, paths: &PathTable) -> Result<()> {
    for binding in cfg.watch.effective_bindings() {
        if !registry.contains(&binding.task) {
            return Err(KitforgeError::config(format!(
                "watch binding for role '{}' names unknown task '{}'",
                binding.role, binding.task
            )));
        }
        paths.get(&binding.role)?;
    }
    Ok(())
}

async fn remove_dirs(task: &str, dirs: Vec<PathBuf>) -> Result<()> {
    for dir in dirs {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => info!(task, dir = %dir.display(), "removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(task, dir = %dir.display(), "nothing to remove");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn clean(ctx: TaskContext) -> Result<()> {
    let paths = &ctx.build().paths;
    let dirs = vec![
        paths.resolve("dist")?,
        paths.resolve("docs_dist")?,
        paths.resolve("lib")?,
    ];
    remove_dirs(ctx.task(), dirs).await
}

async fn build_clean(ctx: TaskContext) -> Result<()> {
    let paths = &ctx.build().paths;
    let dirs = vec![paths.resolve("dist")?, paths.resolve("lib")?];
    remove_dirs(ctx.task(), dirs).await
}

async fn docs_clean(ctx: TaskContext) -> Result<()> {
    let dirs = vec![ctx.build().paths.resolve("docs_dist")?];
    remove_dirs(ctx.task(), dirs).await
}

async fn style_scss(ctx: TaskContext) -> Result<()> {
    let build = ctx.build();
    let pipeline = presets::style(build)?;
    presets::run_for_role(build, "style_entry", &pipeline).await?;
    Ok(())
}

async fn style_fonts(ctx: TaskContext) -> Result<()> {
    let build = ctx.build();
    let pipeline = presets::fonts(build)?;
    presets::run_for_role(build, "fonts", &pipeline).await?;
    Ok(())
}

async fn build_babel(ctx: TaskContext) -> Result<()> {
    let build = ctx.build();
    let pipeline = presets::transpile(build)?;
    presets::run_for_role(build, "scripts", &pipeline).await?;
    Ok(())
}

async fn bundle(ctx: &TaskContext, variant: BundleVariant) -> Result<()> {
    let build = ctx.build();
    let pipeline = presets::bundle(build, variant)?;
    presets::run_for_role(build, variant.entry_role(), &pipeline).await?;
    Ok(())
}

async fn build_pack(ctx: TaskContext) -> Result<()> {
    bundle(&ctx, BundleVariant::Full).await
}

async fn build_pack_jq(ctx: TaskContext) -> Result<()> {
    bundle(&ctx, BundleVariant::Lite).await
}

async fn jq_md2json(ctx: TaskContext) -> Result<()> {
    let build = ctx.build();
    let pipeline = presets::markdown(build)?;
    presets::run_for_role(build, "markdown_docs", &pipeline).await?;
    Ok(())
}

/// Register the watch bindings and hand the watch loop to the session.
async fn watch(ctx: TaskContext) -> Result<()> {
    let build = ctx.build();
    let watch_cfg = &build.config.watch;

    let profiles = build_task_watch_profiles(&watch_cfg.effective_bindings(), &build.paths)?;
    let behaviour = TriggerWhileRunningBehaviour::from_str(&watch_cfg.triggered_while_running_behaviour)
        .map_err(KitforgeError::Config)?;
    let queue = TriggerQueue::new(behaviour, watch_cfg.queue_length);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let watcher = spawn_watcher(&build.root, profiles, tx.clone())?;
    let runtime = Runtime::new(ctx.sequencer().fresh_invocation(), queue, tx, rx);

    ctx.session().spawn_service("watch", async move {
        let _watcher = watcher;
        runtime.run().await
    });
    Ok(())
}

/// Bind the dev server and hand it to the session.
async fn server(ctx: TaskContext) -> Result<()> {
    let build = ctx.build();
    let hub = ctx.session().hmr().clone();

    let config = DevServerConfig::from_context(build)?;
    let bundler = Arc::new(DevBundler::from_context(build)?);
    let watcher = watch_bundle_sources(build, Arc::clone(&bundler), hub.clone())?;
    let server = DevServer::bind(&config, bundler, hub).await?.with_watcher(watcher);

    info!(addr = %server.local_addr(), prefix = %config.log_prefix, "dev server bound");
    ctx.session().spawn_service("server", server.serve());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;
    use crate::task::TaskBody;
    use std::collections::BTreeMap;

    const OPERATOR_TASKS: [&str; 16] = [
        "clean",
        "build:clean",
        "style:scss",
        "style:fonts",
        "style",
        "build:babel",
        "build:pack",
        "build:pack:jq",
        "build",
        "watch",
        "docs:clean",
        "server",
        "docs",
        "jq:md2json",
        "docs:jq",
        "default",
    ];

    #[test]
    fn registers_every_operator_task() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), OPERATOR_TASKS.len());
        for name in OPERATOR_TASKS {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn build_runs_clean_before_the_parallel_group() {
        let registry = registry().unwrap();
        let TaskBody::Sequence(seq) = registry.get("build").unwrap().body() else {
            panic!("build should run a sequence");
        };
        assert_eq!(
            seq.to_string(),
            "build:clean -> [style, build:babel, build:pack, build:pack:jq]"
        );
    }

    #[test]
    fn groups_carry_their_prerequisites() {
        let registry = registry().unwrap();
        assert_eq!(registry.get("style").unwrap().prereqs(), ["style:scss", "style:fonts"]);
        assert_eq!(registry.get("default").unwrap().prereqs(), ["docs", "watch"]);
        assert_eq!(registry.get("docs:jq").unwrap().prereqs(), ["jq:md2json"]);
    }

    #[test]
    fn default_bindings_are_valid() {
        let registry = registry().unwrap();
        let paths = PathTable::new("/proj", &BTreeMap::new());
        validate_bindings(&ConfigFile::default(), &registry, &paths).unwrap();
    }

    #[test]
    fn bindings_to_unknown_tasks_or_roles_fail() {
        let registry = registry().unwrap();
        let paths = PathTable::new("/proj", &BTreeMap::new());

        let mut cfg = ConfigFile::default();
        cfg.watch.bindings = Some(vec![BindingConfig {
            role: "style_modules".into(),
            task: "lint".into(),
        }]);
        assert!(validate_bindings(&cfg, &registry, &paths).is_err());

        cfg.watch.bindings = Some(vec![BindingConfig {
            role: "images".into(),
            task: "style:scss".into(),
        }]);
        assert!(matches!(
            validate_bindings(&cfg, &registry, &paths),
            Err(KitforgeError::UnknownRole(_))
        ));
    }

    #[tokio::test]
    async fn removing_missing_dirs_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("dist");
        std::fs::create_dir_all(present.join("nested")).unwrap();

        remove_dirs("clean", vec![present.clone(), dir.path().join("lib")])
            .await
            .unwrap();
        assert!(!present.exists());
    }
}

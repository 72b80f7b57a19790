// src/context.rs

//! Read-only build configuration handed to every task and pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::banner::{Banner, Clock, SystemClock};
use crate::config::ConfigFile;
use crate::env::BuildMode;
use crate::errors::Result;
use crate::exec::ToolCommand;
use crate::package::PackageMeta;
use crate::paths::PathTable;

/// External tools resolved from `[tools]`, all running in the project root.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub bundler: ToolCommand,
    pub transpiler: ToolCommand,
    pub js_minifier: ToolCommand,
}

impl Toolchain {
    pub fn from_config(cfg: &ConfigFile, root: &Path) -> Self {
        Self {
            bundler: ToolCommand::new("bundler", &cfg.tools.bundler, root),
            transpiler: ToolCommand::new("transpiler", &cfg.tools.transpiler, root),
            js_minifier: ToolCommand::new("js-minifier", &cfg.tools.js_minifier, root),
        }
    }
}

/// Everything a task may read. Constructed once; never mutated.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub root: PathBuf,
    pub mode: BuildMode,
    pub paths: PathTable,
    pub package: PackageMeta,
    pub banner: Banner,
    pub tools: Toolchain,
    pub config: ConfigFile,
}

impl BuildContext {
    /// Resolve the context from config, reading the package manifest and the
    /// environment switch.
    pub fn load(root: impl Into<PathBuf>, config: ConfigFile) -> Result<Self> {
        let mode = BuildMode::from_env(&config.project.env_var);
        Self::with_mode(root, config, mode, Arc::new(SystemClock))
    }

    /// Same as [`BuildContext::load`] with an explicit mode and clock.
    pub fn with_mode(
        root: impl Into<PathBuf>,
        config: ConfigFile,
        mode: BuildMode,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let root = root.into();
        let package = PackageMeta::load(&root.join(&config.project.manifest))?;
        let banner = Banner::new(
            &package,
            config.banner.author.clone(),
            config.banner.holder.clone(),
            clock,
        );
        let paths = PathTable::new(&root, &config.paths);
        let tools = Toolchain::from_config(&config, &root);

        Ok(Self {
            root,
            mode,
            paths,
            package,
            banner,
            tools,
            config,
        })
    }

    /// Base filename for emitted artifacts (`<product>.js`, `<product>.css`).
    pub fn product(&self) -> &str {
        self.config
            .project
            .product
            .as_deref()
            .unwrap_or_else(|| self.package.product_name())
    }

    /// Output root for environment-routed artifacts (styles, fonts).
    pub fn routed_output(&self) -> Result<PathBuf> {
        let dist = self.paths.resolve("dist")?;
        let docs = self.paths.resolve("docs_dist")?;
        Ok(self.mode.output_root(&dist, &docs))
    }
}

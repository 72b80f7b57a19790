// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `kitforge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kitforge",
    version,
    about = "Build styles, scripts, bundles and the docs server of a UI component library.",
    long_about = None
)]
pub struct CliArgs {
    /// Tasks to run. Several names run side by side as one parallel group.
    ///
    /// Default: `default` (docs server + watch).
    #[arg(value_name = "TASK", default_value = "default")]
    pub tasks: Vec<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Kitforge.toml` in the current working directory. A missing
    /// file is fine; every setting has a default.
    #[arg(long, value_name = "PATH", default_value = "Kitforge.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KITFORGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate config and task graph, print them, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

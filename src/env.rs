// src/env.rs

//! The environment switch: production vs. development.
//!
//! Read once at startup and carried inside [`crate::context::BuildContext`];
//! nothing reads the environment variable afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

/// Build mode selected by the environment switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    Production,
    #[default]
    Development,
}

impl BuildMode {
    /// Interpret the raw value of the environment variable. Absence, or any
    /// value other than `production`, means development.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "production" => BuildMode::Production,
            _ => BuildMode::Development,
        }
    }

    /// Read the mode from the process environment.
    pub fn from_env(var: &str) -> Self {
        Self::from_env_value(std::env::var(var).ok().as_deref())
    }

    pub fn is_production(self) -> bool {
        matches!(self, BuildMode::Production)
    }

    /// Pick the output root for environment-routed artifacts: `dist` in
    /// production, `docs_dist` otherwise. Exactly one of the two, always.
    pub fn select_output<'a>(self, dist: &'a Path, docs_dist: &'a Path) -> &'a Path {
        match self {
            BuildMode::Production => dist,
            BuildMode::Development => docs_dist,
        }
    }

    /// Owned variant of [`BuildMode::select_output`].
    pub fn output_root(self, dist: &Path, docs_dist: &Path) -> PathBuf {
        self.select_output(dist, docs_dist).to_path_buf()
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Production => f.write_str("production"),
            BuildMode::Development => f.write_str("development"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_means_development() {
        assert_eq!(BuildMode::from_env_value(None), BuildMode::Development);
        assert_eq!(BuildMode::from_env_value(Some("dev")), BuildMode::Development);
        assert_eq!(
            BuildMode::from_env_value(Some("Production")),
            BuildMode::Production
        );
    }

    #[test]
    fn routing_picks_exactly_one_root() {
        let dist = Path::new("dist");
        let docs = Path::new("www");
        assert_eq!(BuildMode::Production.select_output(dist, docs), dist);
        assert_eq!(BuildMode::Development.select_output(dist, docs), docs);
    }
}

// src/config/validate.rs

use std::str::FromStr;

use anyhow::{Context, Result, anyhow};

use crate::config::model::ConfigFile;
use crate::engine::TriggerWhileRunningBehaviour;

/// Run basic semantic validation against a loaded configuration.
///
/// This checks:
/// - `triggered_while_running_behaviour` is valid ("queue" or "cancel")
/// - `queue_length >= 1`
/// - the server port is non-zero and the public path is absolute
/// - at least one browser query and one transpile extension exist
///
/// Checks that need the task registry or the path table (watch bindings
/// naming unknown tasks or roles) run later, in `builtin::validate_bindings`.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_watch(cfg)?;
    validate_server(cfg)?;
    validate_pipelines(cfg)?;
    Ok(())
}

fn validate_watch(cfg: &ConfigFile) -> Result<()> {
    TriggerWhileRunningBehaviour::from_str(&cfg.watch.triggered_while_running_behaviour)
        .map_err(|e| anyhow!(e))
        .context("invalid [watch].triggered_while_running_behaviour")?;

    if cfg.watch.queue_length == 0 {
        return Err(anyhow!("[watch].queue_length must be >= 1 (got 0)"));
    }

    Ok(())
}

fn validate_server(cfg: &ConfigFile) -> Result<()> {
    if cfg.server.port == 0 {
        return Err(anyhow!("[server].port must be non-zero"));
    }
    if !cfg.server.public_path.starts_with('/') {
        return Err(anyhow!(
            "[server].public_path must start with '/' (got '{}')",
            cfg.server.public_path
        ));
    }
    if cfg.server.bundle_name.trim().is_empty() || cfg.server.bundle_name.contains('/') {
        return Err(anyhow!(
            "[server].bundle_name must be a plain file name (got '{}')",
            cfg.server.bundle_name
        ));
    }
    Ok(())
}

fn validate_pipelines(cfg: &ConfigFile) -> Result<()> {
    if cfg.style.browsers.is_empty() {
        return Err(anyhow!("[style].browsers must list at least one query"));
    }
    if cfg.transpile.extensions.is_empty() {
        return Err(anyhow!("[transpile].extensions must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ConfigFile {
        toml::from_str(src).expect("valid toml")
    }

    #[test]
    fn empty_config_is_valid() {
        assert!(validate_config(&ConfigFile::default()).is_ok());
    }

    #[test]
    fn rejects_unknown_behaviour() {
        let cfg = parse(
            r#"
            [watch]
            triggered_while_running_behaviour = "race"
            "#,
        );
        let err = validate_config(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("triggered_while_running_behaviour"));
    }

    #[test]
    fn rejects_zero_queue_length() {
        let cfg = parse("[watch]\nqueue_length = 0\n");
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_relative_public_path() {
        let cfg = parse("[server]\npublic_path = \"static\"\n");
        assert!(validate_config(&cfg).is_err());
    }
}

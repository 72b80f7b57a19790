// src/errors.rs

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KitforgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Unknown path role: {0}")]
    UnknownRole(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Style error in {path}: {message}")]
    Style { path: String, message: String },

    #[error("Tool '{tool}' failed ({status}): {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KitforgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        KitforgeError::Config(msg.into())
    }

    pub fn style(path: impl Into<String>, message: impl ToString) -> Self {
        KitforgeError::Style {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, KitforgeError>;

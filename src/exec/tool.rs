// src/exec/tool.rs

//! External collaborators (bundler, transpiler, JS minifier) invoked as
//! shell command templates.
//!
//! A template like `npx babel --filename {file}` has its placeholders
//! replaced with shell-quoted values. Input goes to the child's stdin; the
//! result is read from stdout, or from `{output}` when the template names an
//! output file.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{KitforgeError, Result};

const OUTPUT_PLACEHOLDERS: &[&str] = &["{output}", "{output_dir}", "{output_name}"];

#[derive(Debug, Clone)]
pub struct ToolCommand {
    name: String,
    template: String,
    cwd: PathBuf,
}

impl ToolCommand {
    pub fn new(name: impl Into<String>, template: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            cwd: cwd.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether the tool writes its result to a file rather than stdout.
    pub fn writes_output_file(&self) -> bool {
        OUTPUT_PLACEHOLDERS.iter().any(|p| self.template.contains(p))
    }

    /// Substitute `{key}` placeholders with shell-quoted values.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut cmd = self.template.clone();
        for (key, value) in vars {
            cmd = cmd.replace(&format!("{{{key}}}"), &shell_quote(value));
        }
        cmd
    }

    /// Run the tool and return what it produced.
    pub async fn run(&self, vars: &[(&str, &str)], stdin: Option<&[u8]>) -> Result<Vec<u8>> {
        if !self.writes_output_file() {
            return self.spawn(&self.render(vars), stdin).await;
        }

        let out_dir = tempfile::tempdir()?;
        let output_name = "output.js";
        let output = out_dir.path().join(output_name);
        let output_str = output.to_string_lossy().into_owned();
        let dir_str = out_dir.path().to_string_lossy().into_owned();

        let mut all_vars: Vec<(&str, &str)> = vars.to_vec();
        all_vars.push(("output", &output_str));
        all_vars.push(("output_dir", &dir_str));
        all_vars.push(("output_name", output_name));

        self.spawn(&self.render(&all_vars), stdin).await?;

        tokio::fs::read(&output).await.map_err(|e| KitforgeError::Tool {
            tool: self.name.clone(),
            status: "no output".to_string(),
            stderr: format!("expected output file {}: {e}", output.display()),
        })
    }

    async fn spawn(&self, command_line: &str, stdin: Option<&[u8]>) -> Result<Vec<u8>> {
        info!(tool = %self.name, cmd = %command_line, "running external tool");

        let mut cmd = shell(command_line);
        cmd.current_dir(&self.cwd)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| KitforgeError::Tool {
            tool: self.name.clone(),
            status: "spawn failed".to_string(),
            stderr: e.to_string(),
        })?;

        // Feed stdin from a separate task so a chatty child can't deadlock on
        // a full stdout pipe.
        let writer = match (stdin, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => {
                let bytes = bytes.to_vec();
                Some(tokio::spawn(async move {
                    let res = pipe.write_all(&bytes).await;
                    drop(pipe);
                    res
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output().await?;

        if let Some(handle) = writer {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(tool = %self.name, error = %e, "stdin write ended early"),
                Err(e) => debug!(tool = %self.name, error = %e, "stdin writer task failed"),
            }
        }

        if !output.status.success() {
            return Err(KitforgeError::Tool {
                tool: self.name.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Build a shell command appropriate for the platform.
fn shell(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    }
}

/// Quote a value for POSIX `sh`.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Convenience for path-valued placeholders.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

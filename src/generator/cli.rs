//! Command-line fallback: `<program> run <model> <prompt>`.

use crate::error::{MarqueeError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs the model through its command-line tool with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct CliRunner {
    program: String,
    model: String,
    deadline: Duration,
}

impl CliRunner {
    /// Creates a runner for `program`.
    pub fn new(program: impl Into<String>, model: impl Into<String>, deadline: Duration) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
            deadline,
        }
    }

    fn resolve(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|_| {
            MarqueeError::Generation(format!(
                "{} CLI not found on PATH; install it from https://ollama.com/download",
                self.program
            ))
        })
    }

    /// Runs one generation and returns stdout.
    ///
    /// # Errors
    ///
    /// Missing executable, spawn failure, timeout, or non-zero exit.
    pub async fn run(&self, prompt: &str) -> Result<String> {
        let program = self.resolve()?;
        tracing::debug!(program = %program.display(), model = %self.model, "running model CLI");

        let child = Command::new(&program)
            .arg("run")
            .arg(&self.model)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MarqueeError::Generation(format!("failed to start {}: {e}", self.program)))?;

        let output = tokio::time::timeout(self.deadline, child.wait_with_output())
            .await
            .map_err(|_| {
                MarqueeError::Generation(format!(
                    "{} run timed out after {}s",
                    self.program,
                    self.deadline.as_secs()
                ))
            })?
            .map_err(|e| {
                MarqueeError::Generation(format!("{} run failed: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MarqueeError::Generation(format!(
                "{} run failed ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

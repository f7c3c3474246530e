//! Text generation with a service → CLI fallback chain.
//!
//! Each call tries the model service first: probe `/api/tags`, require the
//! configured model, then `/api/chat`. Any failure on that path is logged and
//! the command-line tool is tried once. Only a CLI failure reaches the caller.

pub mod cli;
pub mod ollama;
pub mod prompt;

pub use cli::CliRunner;
pub use ollama::{ChatOptions, OllamaClient, ProbeStatus};

use crate::config::LlmConfig;
use crate::error::{MarqueeError, Result};
use chrono::Utc;
use std::fmt;
use std::time::Duration;

/// Which path produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPath {
    Service,
    Cli,
}

impl fmt::Display for GenerationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => f.write_str("service"),
            Self::Cli => f.write_str("cli"),
        }
    }
}

/// Raw model output plus the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub path: GenerationPath,
}

/// Produces raw responses from the configured model.
#[derive(Debug, Clone)]
pub struct Generator {
    service: OllamaClient,
    cli: CliRunner,
}

impl Generator {
    /// Builds the service client and CLI runner from configuration.
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            service: OllamaClient::new(config),
            cli: CliRunner::new(
                config.cli_program.clone(),
                config.model.clone(),
                Duration::from_secs(config.cli_timeout_secs),
            ),
        }
    }

    /// Generates one raw response for the current minute's prompt.
    ///
    /// # Errors
    ///
    /// Returns [`MarqueeError::Generation`] when the CLI fallback fails.
    pub async fn generate(&self) -> Result<Generated> {
        let prompt = prompt::build_prompt(Utc::now());

        match self.try_service(&prompt).await {
            Ok(text) => {
                return Ok(Generated {
                    text,
                    path: GenerationPath::Service,
                });
            }
            Err(e) => {
                tracing::warn!(
                    model = %self.service.model(),
                    error = %e,
                    "service path failed, falling back to CLI"
                );
            }
        }

        let text = self.cli.run(&prompt).await?;
        tracing::info!(model = %self.service.model(), "generated via CLI fallback");
        Ok(Generated {
            text,
            path: GenerationPath::Cli,
        })
    }

    async fn try_service(&self, prompt: &str) -> Result<String> {
        let status = self.service.probe().await;
        if !status.is_available() {
            return Err(MarqueeError::Generation(format!("model service {status}")));
        }
        if !status.has_model(self.service.model()) {
            return Err(MarqueeError::Generation(format!(
                "model {} is not installed on the service",
                self.service.model()
            )));
        }
        self.service.chat(prompt).await
    }
}

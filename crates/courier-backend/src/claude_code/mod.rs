//! Claude Code CLI backend.
//!
//! Uses the locally installed `claude` CLI as a subprocess. Zero API keys
//! needed — relies on the user's existing `claude` authentication.
//!
//! Failed turns surface as sentinel replies inside [`BackendTurn`], never
//! as errors, and the backend never retries on its own: the user re-sends
//! to retry. On timeout or CLI failure the old resume handle is preserved
//! so the next turn continues the same session instead of losing context.

mod command;
mod response;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use courier_core::{message::BackendTurn, traits::Backend};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::error;

/// Default timeout for the CLI subprocess (5 minutes).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Claude Code CLI backend configuration.
pub struct ClaudeCodeBackend {
    /// Binary to invoke.
    binary: String,
    /// Subprocess timeout.
    timeout: Duration,
}

/// JSON response from `claude -p --output-format json`.
#[derive(Debug, Deserialize)]
struct ClaudeCliResponse {
    /// The actual text response.
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

impl ClaudeCodeBackend {
    /// Create a backend with default settings.
    pub fn new() -> Self {
        Self {
            binary: "claude".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a backend from config values.
    pub fn from_config(binary: String, timeout_secs: u64) -> Self {
        Self {
            binary,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Check if the CLI is installed and accessible.
    pub async fn check_cli(binary: &str) -> bool {
        Command::new(binary)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for ClaudeCodeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ClaudeCodeBackend {
    fn name(&self) -> &str {
        "claude-code"
    }

    async fn invoke(
        &self,
        prompt: &str,
        resume_handle: Option<&str>,
        model: &str,
        system_prompt: &str,
    ) -> BackendTurn {
        let start = Instant::now();
        let result = self
            .run_cli(prompt, resume_handle, model, system_prompt)
            .await;

        let mut turn = match result {
            Ok(output) => self.parse_output(&output, resume_handle),
            Err(CliFailure::Timeout) => BackendTurn {
                reply: format!(
                    "(Request timed out after {} seconds. Please try again.)",
                    self.timeout.as_secs()
                ),
                resume_handle: resume_handle.map(String::from),
                elapsed_ms: 0,
            },
            Err(CliFailure::NotFound) => BackendTurn {
                reply: format!(
                    "(Error: {} CLI not found. Is it installed and in PATH?)",
                    self.binary
                ),
                resume_handle: None,
                elapsed_ms: 0,
            },
            Err(CliFailure::Spawn(e)) => {
                error!("failed to run {}: {e}", self.binary);
                BackendTurn {
                    reply: "(Claude error — check agent logs for details.)".to_string(),
                    resume_handle: resume_handle.map(String::from),
                    elapsed_ms: 0,
                }
            }
        };

        turn.elapsed_ms = start.elapsed().as_millis() as u64;
        turn
    }

    async fn is_available(&self) -> bool {
        Self::check_cli(&self.binary).await
    }
}

/// Subprocess-level failures, before any output is available.
pub(crate) enum CliFailure {
    Timeout,
    NotFound,
    Spawn(std::io::Error),
}

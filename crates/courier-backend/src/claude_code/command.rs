//! CLI command building and subprocess execution.

use super::{ClaudeCodeBackend, CliFailure};
use tokio::process::Command;
use tracing::debug;

impl ClaudeCodeBackend {
    /// Run one CLI turn with the configured timeout.
    ///
    /// A resume handle continues an existing session via `--resume` (the
    /// CLI ignores any system prompt there); otherwise the new session is
    /// seeded with `--system-prompt`.
    pub(super) async fn run_cli(
        &self,
        prompt: &str,
        resume_handle: Option<&str>,
        model: &str,
        system_prompt: &str,
    ) -> Result<std::process::Output, CliFailure> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg("--dangerously-skip-permissions")
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(model);

        match resume_handle {
            Some(handle) => {
                cmd.arg("--resume").arg(handle);
            }
            None => {
                cmd.arg("--system-prompt").arg(system_prompt);
            }
        }
        cmd.arg(prompt);

        // Remove CLAUDECODE so the CLI doesn't think it's nested.
        cmd.env_remove("CLAUDECODE");
        // Reap the child when the timeout fires.
        cmd.kill_on_drop(true);

        debug!(
            "executing: {} -p --output-format json (resume: {})",
            self.binary,
            resume_handle.is_some()
        );

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => Err(CliFailure::Timeout),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(CliFailure::NotFound),
            Ok(Err(e)) => Err(CliFailure::Spawn(e)),
            Ok(Ok(output)) => Ok(output),
        }
    }
}

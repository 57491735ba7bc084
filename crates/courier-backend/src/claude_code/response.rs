//! CLI output parsing with sentinel fallbacks.

use super::{ClaudeCliResponse, ClaudeCodeBackend};
use courier_core::message::BackendTurn;
use tracing::{debug, error, warn};

impl ClaudeCodeBackend {
    /// Turn raw CLI output into a `BackendTurn`.
    ///
    /// Every failure shape maps to a sentinel reply: a non-zero exit or
    /// malformed JSON must not drop the turn on the floor, and neither may
    /// discard the caller's resume handle.
    pub(super) fn parse_output(
        &self,
        output: &std::process::Output,
        resume_handle: Option<&str>,
    ) -> BackendTurn {
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            error!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                truncate_chars(err, 300)
            );
            return BackendTurn {
                reply: "(Claude error — check agent logs for details.)".to_string(),
                resume_handle: resume_handle.map(String::from),
                elapsed_ms: 0,
            };
        }

        match serde_json::from_str::<ClaudeCliResponse>(&stdout) {
            Ok(resp) => {
                let reply = match resp.result.as_deref().map(str::trim) {
                    Some(r) if !r.is_empty() => r.to_string(),
                    _ => "(No response from Claude.)".to_string(),
                };
                let resume_handle = resp
                    .session_id
                    .filter(|s| !s.is_empty())
                    .or_else(|| resume_handle.map(String::from));
                BackendTurn {
                    reply,
                    resume_handle,
                    elapsed_ms: 0,
                }
            }
            Err(e) => {
                // Not JSON — relay a truncated slice of the raw output
                // rather than failing the whole dispatch.
                warn!("failed to parse {} JSON response: {e}", self.binary);
                debug!("raw stdout (first 500 chars): {}", truncate_chars(&stdout, 500));
                let trimmed = stdout.trim();
                let reply = if trimmed.is_empty() {
                    "(Empty response.)".to_string()
                } else {
                    truncate_chars(trimmed, 500)
                };
                BackendTurn {
                    reply,
                    resume_handle: resume_handle.map(String::from),
                    elapsed_ms: 0,
                }
            }
        }
    }
}

/// First `n` chars of `s` (char-boundary safe).
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

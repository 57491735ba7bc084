//! Tests for the Claude Code CLI backend.
//!
//! Subprocess behavior is exercised with stub shell scripts standing in
//! for the real CLI, so no `claude` installation (or network) is needed.

use super::*;
use courier_core::traits::Backend;
use std::path::{Path, PathBuf};

#[test]
fn test_default_backend() {
    let backend = ClaudeCodeBackend::new();
    assert_eq!(backend.name(), "claude-code");
    assert_eq!(backend.binary, "claude");
    assert_eq!(backend.timeout, Duration::from_secs(300));
}

#[test]
fn test_from_config() {
    let backend = ClaudeCodeBackend::from_config("claude-dev".into(), 120);
    assert_eq!(backend.binary, "claude-dev");
    assert_eq!(backend.timeout, Duration::from_secs(120));
}

#[cfg(unix)]
fn write_stub(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("claude-stub");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
fn backend_for(script: &Path, timeout_secs: u64) -> ClaudeCodeBackend {
    ClaudeCodeBackend::from_config(script.to_string_lossy().into_owned(), timeout_secs)
}

#[cfg(unix)]
#[tokio::test]
async fn test_successful_turn_returns_reply_and_handle() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_stub(
        tmp.path(),
        r#"echo '{"result":"hello there","session_id":"sess-1"}'"#,
    );
    let backend = backend_for(&script, 10);

    let turn = backend.invoke("hi", None, "sonnet", "be brief").await;
    assert_eq!(turn.reply, "hello there");
    assert_eq!(turn.resume_handle.as_deref(), Some("sess-1"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_empty_result_uses_placeholder() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_stub(tmp.path(), r#"echo '{"result":"","session_id":"sess-2"}'"#);
    let backend = backend_for(&script, 10);

    let turn = backend.invoke("hi", None, "sonnet", "").await;
    assert_eq!(turn.reply, "(No response from Claude.)");
    assert_eq!(turn.resume_handle.as_deref(), Some("sess-2"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_session_id_keeps_old_handle() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_stub(tmp.path(), r#"echo '{"result":"ok"}'"#);
    let backend = backend_for(&script, 10);

    let turn = backend.invoke("hi", Some("old-sess"), "sonnet", "").await;
    assert_eq!(turn.reply, "ok");
    assert_eq!(turn.resume_handle.as_deref(), Some("old-sess"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_malformed_output_relayed_truncated() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_stub(tmp.path(), "echo not json at all");
    let backend = backend_for(&script, 10);

    let turn = backend.invoke("hi", Some("old-sess"), "sonnet", "").await;
    assert_eq!(turn.reply, "not json at all");
    // Old handle preserved so the next turn still resumes.
    assert_eq!(turn.resume_handle.as_deref(), Some("old-sess"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_nonzero_exit_sentinel_preserves_handle() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_stub(tmp.path(), "echo bad >&2; exit 3");
    let backend = backend_for(&script, 10);

    let turn = backend.invoke("hi", Some("old-sess"), "sonnet", "").await;
    assert!(turn.reply.contains("Claude error"));
    assert_eq!(turn.resume_handle.as_deref(), Some("old-sess"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_sentinel_preserves_handle() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_stub(tmp.path(), "sleep 5");
    let backend = backend_for(&script, 1);

    let turn = backend.invoke("hi", Some("old-sess"), "sonnet", "").await;
    assert!(turn.reply.contains("timed out after 1 seconds"));
    assert_eq!(turn.resume_handle.as_deref(), Some("old-sess"));
}

#[tokio::test]
async fn test_binary_not_found_sentinel_empty_handle() {
    let backend =
        ClaudeCodeBackend::from_config("/nonexistent/claude-binary".into(), 5);
    let turn = backend.invoke("hi", Some("old-sess"), "sonnet", "").await;
    assert!(turn.reply.contains("not found"));
    // No session is created when the CLI itself is missing.
    assert!(turn.resume_handle.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_fresh_session_gets_system_prompt_resume_does_not() {
    // The stub echoes its arguments back as the "result" so the test can
    // see exactly which flags the invoker passed.
    let tmp = tempfile::tempdir().unwrap();
    let script = write_stub(
        tmp.path(),
        r#"printf '{"result":"args: %s","session_id":"s"}' "$*""#,
    );
    let backend = backend_for(&script, 10);

    let fresh = backend.invoke("hi", None, "sonnet", "SYSTEM").await;
    assert!(fresh.reply.contains("--system-prompt"));
    assert!(!fresh.reply.contains("--resume"));

    let resumed = backend.invoke("hi", Some("sess-9"), "sonnet", "SYSTEM").await;
    assert!(resumed.reply.contains("--resume"));
    assert!(resumed.reply.contains("sess-9"));
    assert!(!resumed.reply.contains("--system-prompt"));
}

#[tokio::test]
async fn test_is_available_false_for_missing_binary() {
    let backend = ClaudeCodeBackend::from_config("/nonexistent/claude-binary".into(), 5);
    assert!(!backend.is_available().await);
}

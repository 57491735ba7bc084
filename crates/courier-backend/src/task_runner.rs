//! Long-running task execution via an external runner script.
//!
//! A task-class message becomes a one-task markdown file handed to the
//! configured runner (`<runner> --model <model> <task-file>`). The result
//! is summarized as plain text for the conversation; the runner's own logs
//! carry the detail.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info};

/// Runs one task to completion under its own timeout.
pub struct TaskRunner {
    runner_path: PathBuf,
    model: String,
    timeout: Duration,
    /// Directory for generated task files.
    tasks_dir: PathBuf,
}

impl TaskRunner {
    pub fn new(
        runner_path: impl Into<PathBuf>,
        model: String,
        timeout_secs: u64,
        tasks_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner_path: runner_path.into(),
            model,
            timeout: Duration::from_secs(timeout_secs),
            tasks_dir: tasks_dir.into(),
        }
    }

    /// Execute a task, blocking until it completes, fails, or times out.
    /// Always returns user-facing summary text.
    pub async fn run(&self, task_text: &str, conversation_id: &str) -> String {
        if !self.runner_path.exists() {
            return format!(
                "(Error: task runner not found at {}.)",
                self.runner_path.display()
            );
        }

        let task_file = match self.write_task_file(task_text, conversation_id) {
            Ok(path) => path,
            Err(e) => {
                error!("failed to write task file: {e}");
                return "(Error: could not write task file — check agent logs.)".to_string();
            }
        };

        info!(
            "running task for {conversation_id} via {}",
            self.runner_path.display()
        );

        let mut cmd = Command::new(&self.runner_path);
        cmd.arg("--model")
            .arg(&self.model)
            .arg(&task_file)
            .env_remove("CLAUDECODE")
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => format!(
                "Task timed out (exceeded {}s limit).",
                self.timeout.as_secs()
            ),
            Ok(Err(e)) => {
                error!("failed to run task runner: {e}");
                "(Error: could not start the task runner — check agent logs.)".to_string()
            }
            Ok(Ok(output)) if output.status.success() => "Task completed successfully.".to_string(),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let err = if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                };
                format!("Task failed: {}", err.chars().take(300).collect::<String>())
            }
        }
    }

    /// Write the one-task markdown file. Conversation ids are truncated in
    /// the filename to stay clear of filesystem limits.
    fn write_task_file(&self, task_text: &str, conversation_id: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.tasks_dir)?;
        let short_id: String = conversation_id.chars().take(24).collect();
        let stamp = chrono::Utc::now().timestamp();
        let path = self.tasks_dir.join(format!("task-{short_id}-{stamp}.md"));
        std::fs::write(&path, format!("## Courier Task\n- {task_text}\n"))?;
        Ok(path)
    }

    pub fn runner_path(&self) -> &Path {
        &self.runner_path
    }
}

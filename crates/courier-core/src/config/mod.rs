mod defaults;
mod transports;


pub use transports::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CourierError;
use defaults::*;

/// Top-level Courier configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub courier: CourierConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// General agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Directory for cursor/session state and task files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Backend (claude CLI) settings for chat turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Binary to invoke.
    #[serde(default = "default_backend_binary")]
    pub binary: String,
    /// Model passed via `--model`.
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Hard wall-clock timeout per invocation.
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
    /// System prompt used to seed fresh sessions.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Optional persona file prepended to the system prompt on fresh
    /// sessions. Missing file = run without it.
    #[serde(default = "default_soul_path")]
    pub soul_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            binary: default_backend_binary(),
            model: default_chat_model(),
            timeout_secs: default_backend_timeout(),
            system_prompt: default_system_prompt(),
            soul_path: default_soul_path(),
        }
    }
}

/// Long-running task execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Runner script invoked as `<runner> --model <model> <task-file>`.
    #[serde(default = "default_task_runner")]
    pub runner_path: String,
    #[serde(default = "default_task_model")]
    pub model: String,
    #[serde(default = "default_task_timeout")]
    pub timeout_secs: u64,
    /// Bounded worker pool size for the task class.
    #[serde(default = "default_task_workers")]
    pub workers: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            runner_path: default_task_runner(),
            model: default_task_model(),
            timeout_secs: default_task_timeout(),
            workers: default_task_workers(),
        }
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bounded worker pool size for the chat class.
    #[serde(default = "default_chat_workers")]
    pub chat_workers: usize,
    /// Initial work class: "chat" or "task". Switched at runtime via `/mode`.
    #[serde(default = "default_mode")]
    pub mode: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chat_workers: default_chat_workers(),
            mode: default_mode(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Credentials left
/// empty in the file are filled from environment variables so secrets
/// never need to live on disk.
pub fn load(path: &str) -> Result<Config, CourierError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CourierError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| CourierError::Config(format!("failed to parse config: {e}")))?
    } else {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        Config::default()
    };

    config.transport.fill_from_env();

    if config.dispatch.mode != "chat" && config.dispatch.mode != "task" {
        return Err(CourierError::Config(format!(
            "dispatch.mode must be \"chat\" or \"task\", got {:?}",
            config.dispatch.mode
        )));
    }

    Ok(config)
}

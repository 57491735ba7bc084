//! Serde default functions for config fields.

pub fn default_name() -> String {
    "courier".to_string()
}

pub fn default_data_dir() -> String {
    "~/.courier".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_backend_binary() -> String {
    "claude".to_string()
}

pub fn default_chat_model() -> String {
    "sonnet".to_string()
}

pub fn default_backend_timeout() -> u64 {
    300
}

pub fn default_system_prompt() -> String {
    "You are a helpful assistant. Be concise — your replies are sent via a chat app.".to_string()
}

pub fn default_soul_path() -> String {
    "SOUL.md".to_string()
}

pub fn default_task_runner() -> String {
    "./agent-loop.sh".to_string()
}

pub fn default_task_model() -> String {
    "opus".to_string()
}

pub fn default_task_timeout() -> u64 {
    600
}

pub fn default_task_workers() -> usize {
    2
}

pub fn default_chat_workers() -> usize {
    4
}

pub fn default_mode() -> String {
    "chat".to_string()
}

pub fn default_poll_timeout() -> u64 {
    30
}

pub fn default_poll_interval() -> u64 {
    30
}

use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransportConfig {
    pub telegram: Option<TelegramConfig>,
    pub teams: Option<TeamsConfig>,
}

impl TransportConfig {
    /// Fill credentials left empty in the file from environment variables.
    pub fn fill_from_env(&mut self) {
        if let Some(ref mut tg) = self.telegram {
            fill(&mut tg.bot_token, "TELEGRAM_BOT_TOKEN");
        }
        if let Some(ref mut teams) = self.teams {
            fill(&mut teams.client_id, "TEAMS_CLIENT_ID");
            fill(&mut teams.client_secret, "TEAMS_CLIENT_SECRET");
            fill(&mut teams.tenant_id, "TEAMS_TENANT_ID");
            fill(&mut teams.user_id, "TEAMS_USER_ID");
        }
    }
}

fn fill(field: &mut String, var: &str) {
    if field.is_empty() {
        if let Ok(value) = std::env::var(var) {
            *field = value;
        }
    }
}

/// Telegram bot config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bot token from @BotFather. Empty = read TELEGRAM_BOT_TOKEN.
    #[serde(default)]
    pub bot_token: String,
    /// Numeric user IDs allowed to talk to the bot. Empty = allow all
    /// (logged as a standing security warning).
    #[serde(default)]
    pub allowed_users: Vec<i64>,
    /// Long-poll timeout passed to getUpdates.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

/// Microsoft Teams config (Graph API, app-only client credentials).
///
/// Because app-only auth has no user session, `user_id` identifies the
/// Teams user whose 1-on-1 chats are monitored (Azure Portal → Users →
/// Object ID).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub tenant_id: String,
    /// Object ID of the monitored Teams user.
    #[serde(default)]
    pub user_id: String,
    /// Object IDs of permitted senders. Empty = allow all.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl TeamsConfig {
    /// Names of credential fields that are still empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_empty() {
            missing.push("TEAMS_CLIENT_ID");
        }
        if self.client_secret.is_empty() {
            missing.push("TEAMS_CLIENT_SECRET");
        }
        if self.tenant_id.is_empty() {
            missing.push("TEAMS_TENANT_ID");
        }
        if self.user_id.is_empty() {
            missing.push("TEAMS_USER_ID");
        }
        missing
    }
}

//! Telegram Bot API transport.
//!
//! Uses long polling via `getUpdates` and `sendMessage` for responses.
//! Docs: <https://core.telegram.org/bots/api>
//!
//! Telegram numbers every update with a global `update_id`, so the whole
//! transport uses a single cursor key rather than one per conversation.

use async_trait::async_trait;
use courier_core::{
    config::TelegramConfig,
    error::CourierError,
    marker::Marker,
    message::InboundMessage,
    traits::{Fetch, Transport},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cursor key for the transport-wide `update_id` high-water mark.
const CURSOR_KEY: &str = "updates";

/// Telegram caps sendMessage at 4096 bytes.
const MESSAGE_LIMIT: usize = 4096;

/// Telegram transport using the Bot API with long polling.
pub struct TelegramTransport {
    config: TelegramConfig,
    client: reqwest::Client,
    base_url: String,
}

// --- Telegram API types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    edited_message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TgUser {
    id: i64,
    #[serde(default)]
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

impl TelegramTransport {
    /// Create a new Telegram transport from config.
    pub fn new(config: TelegramConfig) -> Self {
        let base_url = format!("https://api.telegram.org/bot{}", config.bot_token);
        Self {
            config,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn get_updates(&self, offset: Option<u64>) -> Result<Vec<TgUpdate>, CourierError> {
        let mut url = format!(
            "{}/getUpdates?timeout={}",
            self.base_url, self.config.poll_timeout_secs
        );
        if let Some(off) = offset {
            url.push_str(&format!("&offset={off}"));
        }

        // The request timeout sits above the long-poll window so the
        // server, not the client, normally ends the poll.
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.poll_timeout_secs + 5))
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("telegram poll failed: {e}")))?;

        let body: TgResponse<Vec<TgUpdate>> = resp
            .json()
            .await
            .map_err(|e| CourierError::Transport(format!("telegram poll parse failed: {e}")))?;

        if !body.ok {
            return Err(CourierError::Transport(format!(
                "telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(body.result.unwrap_or_default())
    }
}

/// Map a batch of updates onto messages and the new cursor position.
///
/// Every update advances the cursor, including edits, stickers, and other
/// traffic that never becomes an `InboundMessage` — otherwise the next
/// poll would fetch the same updates again.
fn collect_fetch(updates: Vec<TgUpdate>) -> Fetch {
    let mut fetch = Fetch::default();

    for update in updates {
        let marker = Marker::from(update.update_id);
        match fetch.cursors.get(CURSOR_KEY) {
            Some(seen) if *seen >= marker => {}
            _ => {
                fetch.cursors.insert(CURSOR_KEY.to_string(), marker.clone());
            }
        }

        let msg = match update.message.or(update.edited_message) {
            Some(m) => m,
            None => continue,
        };
        let text = match msg.text {
            Some(t) => t,
            None => continue,
        };
        let user = match msg.from {
            Some(u) => u,
            None => continue,
        };

        let sender_name = if let Some(ref un) = user.username {
            format!("@{un}")
        } else if let Some(ref ln) = user.last_name {
            format!("{} {ln}", user.first_name)
        } else {
            user.first_name.clone()
        };

        fetch.messages.push(InboundMessage {
            id: Uuid::new_v4(),
            transport: "telegram".to_string(),
            conversation_id: msg.chat.id.to_string(),
            marker,
            sender_id: user.id.to_string(),
            sender_name: Some(sender_name),
            text,
            timestamp: chrono::Utc::now(),
        });
    }

    fetch
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    fn message_limit(&self) -> usize {
        MESSAGE_LIMIT
    }

    async fn verify(&self) -> Result<String, CourierError> {
        let url = format!("{}/getMe", self.base_url);
        let resp: TgResponse<TgUser> = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("telegram getMe failed: {e}")))?
            .json()
            .await
            .map_err(|e| CourierError::Transport(format!("telegram getMe parse failed: {e}")))?;

        match resp.result {
            Some(me) if resp.ok => Ok(format!(
                "@{} (id={})",
                me.username.unwrap_or_else(|| me.first_name.clone()),
                me.id
            )),
            _ => Err(CourierError::Transport(format!(
                "telegram getMe rejected: {}",
                resp.description.unwrap_or_default()
            ))),
        }
    }

    async fn fetch_new(&self, cursors: &HashMap<String, Marker>) -> Result<Fetch, CourierError> {
        let offset = cursors
            .get(CURSOR_KEY)
            .and_then(Marker::as_u64)
            .map(|id| id + 1);
        let updates = self.get_updates(offset).await?;
        if !updates.is_empty() {
            debug!("telegram poll returned {} update(s)", updates.len());
        }
        Ok(collect_fetch(updates))
    }

    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), CourierError> {
        let chat_id: i64 = conversation_id.parse().map_err(|e| {
            CourierError::Transport(format!("invalid telegram chat_id '{conversation_id}': {e}"))
        })?;

        let url = format!("{}/sendMessage", self.base_url);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("telegram send failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            if error_text.contains("can't parse entities") {
                debug!("Markdown parse failed, retrying as plain text");
                let plain_body = serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                });
                self.client
                    .post(&url)
                    .json(&plain_body)
                    .send()
                    .await
                    .map_err(|e| {
                        CourierError::Transport(format!("telegram send (plain) failed: {e}"))
                    })?;
            } else {
                warn!("telegram send got {status}: {error_text}");
                return Err(CourierError::Transport(format!(
                    "telegram send got {status}"
                )));
            }
        }

        Ok(())
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<(), CourierError> {
        let chat_id: i64 = conversation_id.parse().map_err(|e| {
            CourierError::Transport(format!("invalid telegram chat_id '{conversation_id}': {e}"))
        })?;

        let url = format!("{}/sendChatAction", self.base_url);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing",
        });

        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("telegram sendChatAction failed: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_json(update_id: i64, chat_id: i64, text: &str) -> String {
        format!(
            r#"{{
                "update_id": {update_id},
                "message": {{
                    "message_id": 1,
                    "from": {{"id": 7, "first_name": "Ada", "username": "ada"}},
                    "chat": {{"id": {chat_id}, "type": "private"}},
                    "text": "{text}"
                }}
            }}"#
        )
    }

    #[test]
    fn test_collect_advances_cursor_and_orders_messages() {
        let updates: Vec<TgUpdate> = serde_json::from_str(&format!(
            "[{},{}]",
            update_json(100, 42, "first"),
            update_json(101, 42, "second")
        ))
        .unwrap();

        let fetch = collect_fetch(updates);
        assert_eq!(fetch.messages.len(), 2);
        assert_eq!(fetch.messages[0].text, "first");
        assert_eq!(fetch.messages[0].marker, Marker::new("100"));
        assert_eq!(fetch.messages[1].text, "second");
        assert_eq!(fetch.cursors.get(CURSOR_KEY), Some(&Marker::new("101")));
    }

    #[test]
    fn test_collect_skips_non_text_but_still_advances_cursor() {
        // A sticker-only update has a message without text.
        let json = r#"[{
            "update_id": 200,
            "message": {
                "message_id": 9,
                "from": {"id": 7, "first_name": "Ada"},
                "chat": {"id": 42, "type": "private"}
            }
        }]"#;
        let updates: Vec<TgUpdate> = serde_json::from_str(json).unwrap();

        let fetch = collect_fetch(updates);
        assert!(fetch.messages.is_empty());
        assert_eq!(fetch.cursors.get(CURSOR_KEY), Some(&Marker::new("200")));
    }

    #[test]
    fn test_collect_accepts_edited_message() {
        let json = r#"[{
            "update_id": 300,
            "edited_message": {
                "message_id": 5,
                "from": {"id": 7, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 42, "type": "private"},
                "text": "fixed typo"
            }
        }]"#;
        let updates: Vec<TgUpdate> = serde_json::from_str(json).unwrap();

        let fetch = collect_fetch(updates);
        assert_eq!(fetch.messages.len(), 1);
        assert_eq!(fetch.messages[0].text, "fixed typo");
    }

    #[test]
    fn test_sender_name_prefers_username() {
        let updates: Vec<TgUpdate> =
            serde_json::from_str(&format!("[{}]", update_json(1, 42, "hi"))).unwrap();
        let fetch = collect_fetch(updates);
        assert_eq!(fetch.messages[0].sender_name.as_deref(), Some("@ada"));
    }

    #[test]
    fn test_sender_name_falls_back_to_full_name() {
        let json = r#"[{
            "update_id": 2,
            "message": {
                "message_id": 1,
                "from": {"id": 7, "first_name": "Ada", "last_name": "Lovelace"},
                "chat": {"id": 42, "type": "private"},
                "text": "hi"
            }
        }]"#;
        let updates: Vec<TgUpdate> = serde_json::from_str(json).unwrap();
        let fetch = collect_fetch(updates);
        assert_eq!(
            fetch.messages[0].sender_name.as_deref(),
            Some("Ada Lovelace")
        );
    }

    #[test]
    fn test_empty_batch_leaves_cursor_untouched() {
        let fetch = collect_fetch(Vec::new());
        assert!(fetch.messages.is_empty());
        assert!(fetch.cursors.is_empty());
    }
}

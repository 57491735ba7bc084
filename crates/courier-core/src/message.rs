use crate::marker::Marker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An inbound message observed by a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: Uuid,
    /// Transport name (e.g. "telegram", "teams").
    pub transport: String,
    /// Stable key for the chat stream this message belongs to
    /// (Telegram chat_id, Teams chat id).
    pub conversation_id: String,
    /// Ordering token for this message within its stream.
    pub marker: Marker,
    /// Platform-specific sender ID, used for the allow-list check.
    pub sender_id: String,
    /// Human-readable sender name.
    pub sender_name: Option<String>,
    /// Message text content.
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// First `n` chars of the text, for log lines.
    pub fn preview(&self, n: usize) -> String {
        if self.text.chars().count() > n {
            let truncated: String = self.text.chars().take(n).collect();
            format!("{truncated}...")
        } else {
            self.text.clone()
        }
    }
}

/// One completed backend turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendTurn {
    /// Reply text to relay back to the conversation. Always present —
    /// failures are surfaced as sentinel replies, not errors.
    pub reply: String,
    /// Resume handle for the next turn, when the backend issued or kept one.
    pub resume_handle: Option<String>,
    /// Wall-clock processing time in milliseconds.
    pub elapsed_ms: u64,
}

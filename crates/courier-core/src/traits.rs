use crate::{
    error::CourierError,
    marker::Marker,
    message::{BackendTurn, InboundMessage},
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Result of one poll against a transport.
#[derive(Debug, Default)]
pub struct Fetch {
    /// New text messages, ascending marker order within each conversation.
    pub messages: Vec<InboundMessage>,
    /// Highest marker observed per cursor key — covers every update seen,
    /// including non-text and filtered traffic, so the poll loop never
    /// re-fetches what it has already looked at.
    pub cursors: HashMap<String, Marker>,
}

/// Chat transport trait — the nervous system.
///
/// Every messaging platform (Telegram, Teams) implements this trait. The
/// poll loop owns the cursor; transports report what they saw and never
/// persist anything themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Maximum outbound message size in bytes for this platform.
    fn message_limit(&self) -> usize;

    /// Verify credentials at startup. Returns a human-readable identity
    /// line on success. A failure here is fatal — the poll loop never starts.
    async fn verify(&self) -> Result<String, CourierError>;

    /// Fetch messages newer than the given cursors. May long-poll.
    async fn fetch_new(&self, cursors: &HashMap<String, Marker>) -> Result<Fetch, CourierError>;

    /// Send one already-chunked piece of text to a conversation.
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), CourierError>;

    /// Show a typing indicator while the backend is thinking. Best-effort.
    async fn send_typing(&self, _conversation_id: &str) -> Result<(), CourierError> {
        Ok(())
    }
}

/// Generative backend trait — the brain.
///
/// Wraps an opaque subprocess: given a prompt, an optional resume handle,
/// and a model name, it produces a reply and a new resume handle. A failed
/// turn surfaces as a sentinel reply inside `BackendTurn`, never as `Err` —
/// the user re-sends to retry.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Run one turn. `resume_handle` present continues that session (the
    /// system prompt is ignored by the backend); absent starts a new
    /// session seeded with `system_prompt`.
    async fn invoke(
        &self,
        prompt: &str,
        resume_handle: Option<&str>,
        model: &str,
        system_prompt: &str,
    ) -> BackendTurn;

    /// Check if the backend is installed and ready.
    async fn is_available(&self) -> bool;
}

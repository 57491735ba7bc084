//! Slash command handling.
//!
//! Commands bypass the concurrency gate so `/status` and `/reset` stay
//! responsive while a turn or task is in flight.

use super::{conversation_key, Gateway, Mode, WorkClass};
use courier_core::message::InboundMessage;
use std::sync::Arc;
use tracing::error;

const HELP_TEXT: &str = "/reset — clear this conversation and start fresh\n\
/mode chat — direct conversation with Claude\n\
/mode task — execute via the task runner\n\
/status — show current mode and session count\n\
/help — show this message\n\n\
Anything else is forwarded to Claude.";

impl Gateway {
    pub(super) async fn handle_command(self: &Arc<Self>, msg: &InboundMessage, text: &str) {
        let (cmd, args) = parse_command(text);

        match cmd.as_str() {
            "/reset" => {
                let key = conversation_key(msg);
                match self.sessions.clear(&key) {
                    Ok(_) => {
                        self.send_notice(msg, "Session reset. Starting fresh.").await;
                    }
                    Err(e) => {
                        error!("failed to clear session for {key}: {e}");
                        self.send_notice(
                            msg,
                            "(Error: could not reset the session — check agent logs.)",
                        )
                        .await;
                    }
                }
            }
            "/mode" => match Mode::parse(&args) {
                Some(mode) => {
                    self.set_mode(mode);
                    self.send_notice(msg, &format!("Switched to {} mode.", mode.as_str()))
                        .await;
                }
                None => {
                    self.send_notice(msg, "Usage: /mode chat | /mode task").await;
                }
            },
            "/status" => {
                let status = format!(
                    "Active sessions: {}\nActive tasks: {}\nMode: {}\nModel: {}",
                    self.sessions.len(),
                    self.gate.active(WorkClass::Task),
                    self.current_mode().as_str(),
                    self.model,
                );
                self.send_notice(msg, &status).await;
            }
            "/help" => {
                self.send_notice(msg, HELP_TEXT).await;
            }
            other => {
                self.send_notice(msg, &format!("Unknown command: {other}. Try /help."))
                    .await;
            }
        }
    }
}

/// Split a command line into the lowercased command (any `@botname`
/// suffix stripped) and its argument string.
pub(super) fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or_default().to_lowercase();
    let cmd = cmd.split('@').next().unwrap_or_default().to_string();
    let args = parts.next().unwrap_or("").trim().to_string();
    (cmd, args)
}

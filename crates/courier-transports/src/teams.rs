//! Microsoft Teams transport via the Graph API.
//!
//! Authenticates app-only with client credentials and polls the monitored
//! user's 1-on-1 chats. There is no long-poll equivalent; the gateway's
//! poll interval paces the Graph requests.
//!
//! Teams message IDs are 19-digit microsecond timestamps stored as
//! strings, so the per-chat cursor is a lexicographic high-water mark.

use async_trait::async_trait;
use courier_core::{
    config::TeamsConfig,
    error::CourierError,
    marker::Marker,
    message::InboundMessage,
    traits::{Fetch, Transport},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Graph rejects chat messages well before this, but 4000 keeps chunks
/// comfortably inside the service limit.
const MESSAGE_LIMIT: usize = 4000;

/// Renew the cached token this long before its actual expiry.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Teams transport using Graph app-only auth.
pub struct TeamsTransport {
    config: TeamsConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

// --- Graph API types ---

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct GraphList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GraphChat {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphMessage {
    id: Option<String>,
    #[serde(rename = "messageType")]
    message_type: Option<String>,
    body: Option<GraphBody>,
    from: Option<GraphFrom>,
}

#[derive(Debug, Deserialize)]
struct GraphBody {
    #[serde(rename = "contentType")]
    content_type: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphFrom {
    user: Option<GraphUser>,
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphProfile {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
}

impl TeamsTransport {
    /// Create a new Teams transport from config.
    pub fn new(config: TeamsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a fresh one when the cached
    /// token is missing or close to expiry.
    async fn access_token(&self) -> Result<String, CourierError> {
        {
            let cached = self.token.lock().await;
            if let Some(tok) = cached.as_ref() {
                if tok.expires_at > Instant::now() {
                    return Ok(tok.value.clone());
                }
            }
        }

        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.config.tenant_id
        );
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", "https://graph.microsoft.com/.default"),
            ("grant_type", "client_credentials"),
        ];

        let resp = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("teams token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CourierError::Transport(format!(
                "teams token request got {status}: {body}"
            )));
        }

        let tok: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CourierError::Transport(format!("teams token parse failed: {e}")))?;

        let expires_at =
            Instant::now() + Duration::from_secs(tok.expires_in).saturating_sub(TOKEN_SLACK);
        *self.token.lock().await = Some(CachedToken {
            value: tok.access_token.clone(),
            expires_at,
        });
        debug!("refreshed teams access token (ttl {}s)", tok.expires_in);
        Ok(tok.access_token)
    }

    async fn graph_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CourierError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(format!("{GRAPH_BASE}{path}"))
            .query(query)
            .bearer_auth(token)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("graph GET {path} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CourierError::Transport(format!(
                "graph GET {path} got {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| CourierError::Transport(format!("graph GET {path} parse failed: {e}")))
    }

    async fn graph_post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), CourierError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(format!("{GRAPH_BASE}{path}"))
            .bearer_auth(token)
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("graph POST {path} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CourierError::Transport(format!(
                "graph POST {path} got {status}: {text}"
            )));
        }
        Ok(())
    }

    /// 1-on-1 chats for the monitored user (up to 50).
    async fn list_chats(&self) -> Result<Vec<String>, CourierError> {
        let path = format!("/users/{}/chats", self.config.user_id);
        let list: GraphList<GraphChat> = self
            .graph_get(&path, &[("$filter", "chatType eq 'oneOnOne'"), ("$top", "50")])
            .await?;
        Ok(list.value.into_iter().filter_map(|c| c.id).collect())
    }
}

/// Remove HTML tags and decode entities (Teams sends HTML bodies).
fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    unescape_entities(&out).trim().to_string()
}

fn unescape_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Map one chat's newest-first message page onto inbound messages and the
/// chat's new high-water mark.
///
/// The high-water mark covers every message seen, including the monitored
/// user's own replies, so the cursor always moves past already-processed
/// content. The returned messages are in chronological order.
fn collect_chat_messages(
    items: Vec<GraphMessage>,
    chat_id: &str,
    last_seen: Option<&Marker>,
    own_user_id: &str,
) -> (Vec<InboundMessage>, Option<Marker>) {
    let mut messages = Vec::new();
    let mut max_seen = last_seen.cloned();

    for item in items {
        let msg_id = match item.id {
            Some(id) if !id.is_empty() => id,
            _ => continue,
        };
        let marker = Marker::new(msg_id);

        match max_seen {
            Some(ref seen) if *seen >= marker => {}
            _ => max_seen = Some(marker.clone()),
        }

        // Newest-first page: everything past the old mark has been seen.
        if let Some(seen) = last_seen {
            if marker <= *seen {
                break;
            }
        }

        if item.message_type.as_deref() != Some("message") {
            continue;
        }

        let body = match item.body {
            Some(b) => b,
            None => continue,
        };
        let raw = body.content.unwrap_or_default();
        let text = if body.content_type.as_deref() == Some("html") {
            strip_html(&raw)
        } else {
            raw.trim().to_string()
        };
        if text.is_empty() {
            continue;
        }

        let sender = item.from.and_then(|f| f.user);
        let sender_id = sender
            .as_ref()
            .and_then(|u| u.id.clone())
            .unwrap_or_default();
        if sender_id == own_user_id {
            continue;
        }
        let sender_name = sender.and_then(|u| u.display_name);

        messages.push(InboundMessage {
            id: Uuid::new_v4(),
            transport: "teams".to_string(),
            conversation_id: chat_id.to_string(),
            marker,
            sender_id,
            sender_name,
            text,
            timestamp: chrono::Utc::now(),
        });
    }

    messages.reverse();
    (messages, max_seen)
}

#[async_trait]
impl Transport for TeamsTransport {
    fn name(&self) -> &str {
        "teams"
    }

    fn message_limit(&self) -> usize {
        MESSAGE_LIMIT
    }

    async fn verify(&self) -> Result<String, CourierError> {
        let missing = self.config.missing_credentials();
        if !missing.is_empty() {
            return Err(CourierError::Config(format!(
                "teams credentials missing: {}",
                missing.join(", ")
            )));
        }

        let path = format!("/users/{}", self.config.user_id);
        let profile: GraphProfile = self
            .graph_get(&path, &[("$select", "displayName,userPrincipalName")])
            .await?;
        Ok(format!(
            "{} <{}>",
            profile.display_name.unwrap_or_else(|| "unknown".into()),
            profile.user_principal_name.unwrap_or_default()
        ))
    }

    async fn fetch_new(&self, cursors: &HashMap<String, Marker>) -> Result<Fetch, CourierError> {
        let chats = self.list_chats().await?;
        let mut fetch = Fetch::default();

        for chat_id in chats {
            let path = format!("/chats/{chat_id}/messages");
            let page: GraphList<GraphMessage> = match self
                .graph_get(&path, &[("$top", "20"), ("$orderby", "createdDateTime desc")])
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    // One broken chat must not stall the others.
                    error!("failed to fetch messages for chat {chat_id}: {e}");
                    continue;
                }
            };

            let last_seen = cursors.get(&chat_id);
            let (messages, max_seen) =
                collect_chat_messages(page.value, &chat_id, last_seen, &self.config.user_id);

            if let Some(mark) = max_seen {
                if last_seen.map_or(true, |seen| mark > *seen) {
                    fetch.cursors.insert(chat_id.clone(), mark);
                }
            }
            fetch.messages.extend(messages);
        }

        Ok(fetch)
    }

    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), CourierError> {
        self.graph_post(
            &format!("/chats/{conversation_id}/messages"),
            serde_json::json!({
                "body": { "contentType": "text", "content": text }
            }),
        )
        .await
    }
}

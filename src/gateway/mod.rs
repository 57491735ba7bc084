//! Gateway — the relay loop connecting transports, durable state, and the
//! generative backend.
//!
//! Includes: allow-list enforcement, the per-conversation concurrency
//! gate, bounded worker pools for the two work classes, slash commands,
//! and graceful shutdown.

mod commands;
mod gate;
mod poll;

#[cfg(test)]
mod tests;

pub use gate::{ConversationGate, WorkClass};

use courier_backend::TaskRunner;
use courier_core::{
    chunk::{split_reply, LABEL_RESERVE},
    config::{shellexpand, Config},
    message::InboundMessage,
    traits::{Backend, Transport},
};
use courier_state::{CursorStore, SessionStore};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How often the typing indicator is refreshed during a backend call.
const TYPING_REFRESH: Duration = Duration::from_secs(4);

/// Work class applied to non-command messages. Process-global, switched
/// at runtime with `/mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chat,
    Task,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Task => "task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(Mode::Chat),
            "task" => Some(Mode::Task),
            _ => None,
        }
    }
}

/// One polled transport with its cursor store and pacing interval.
///
/// `pace` is the wait between successful polls: zero for transports that
/// long-poll (Telegram), the configured interval for those that do plain
/// request/response polling (Teams).
pub struct TransportEntry {
    pub transport: Arc<dyn Transport>,
    pub cursors: Arc<CursorStore>,
    pub pace: Duration,
}

/// The central gateway that routes messages between transports and the
/// backend.
pub struct Gateway {
    entries: Vec<TransportEntry>,
    by_name: HashMap<String, Arc<dyn Transport>>,
    backend: Arc<dyn Backend>,
    runner: Arc<TaskRunner>,
    sessions: Arc<SessionStore>,
    gate: ConversationGate,
    chat_permits: Arc<Semaphore>,
    task_permits: Arc<Semaphore>,
    /// In-flight chat and task units, awaited on shutdown so interrupt
    /// never cuts off a turn mid-reply.
    units: Mutex<JoinSet<()>>,
    mode: Mutex<Mode>,
    /// Per-transport sender allow-lists. Empty list = allow everyone.
    allowed: HashMap<String, Vec<String>>,
    model: String,
    system_prompt: String,
    /// Persona text prepended to the system prompt on fresh sessions.
    soul: Option<String>,
}

impl Gateway {
    pub fn new(
        cfg: &Config,
        entries: Vec<TransportEntry>,
        backend: Arc<dyn Backend>,
        runner: Arc<TaskRunner>,
        sessions: Arc<SessionStore>,
    ) -> Arc<Self> {
        let by_name: HashMap<String, Arc<dyn Transport>> = entries
            .iter()
            .map(|e| (e.transport.name().to_string(), e.transport.clone()))
            .collect();

        let mut allowed = HashMap::new();
        if let Some(ref tg) = cfg.transport.telegram {
            allowed.insert(
                "telegram".to_string(),
                tg.allowed_users.iter().map(|id| id.to_string()).collect(),
            );
        }
        if let Some(ref teams) = cfg.transport.teams {
            allowed.insert("teams".to_string(), teams.allowed_users.clone());
        }
        for entry in &entries {
            let name = entry.transport.name();
            let open = allowed
                .get(name)
                .map_or(true, |list: &Vec<String>| list.is_empty());
            if open {
                warn!(
                    "SECURITY WARNING: no allowed users configured for {name} — \
                     anyone who can reach the bot can trigger the backend"
                );
            }
        }

        let soul_path = shellexpand(&cfg.backend.soul_path);
        let soul = match std::fs::read_to_string(&soul_path) {
            Ok(text) if !text.trim().is_empty() => {
                info!("persona loaded from {soul_path}");
                Some(text)
            }
            _ => {
                info!("no persona file at {soul_path} — running without it");
                None
            }
        };

        let mode = Mode::parse(&cfg.dispatch.mode).unwrap_or(Mode::Chat);

        Arc::new(Self {
            entries,
            by_name,
            backend,
            runner,
            sessions,
            gate: ConversationGate::new(),
            chat_permits: Arc::new(Semaphore::new(cfg.dispatch.chat_workers.max(1))),
            task_permits: Arc::new(Semaphore::new(cfg.tasks.workers.max(1))),
            units: Mutex::new(JoinSet::new()),
            mode: Mutex::new(mode),
            allowed,
            model: cfg.backend.model.clone(),
            system_prompt: cfg.backend.system_prompt.clone(),
            soul,
        })
    }

    /// Verify every transport, then poll them until shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "courier gateway running | backend: {} | transports: {} | mode: {}",
            self.backend.name(),
            self.by_name.keys().cloned().collect::<Vec<_>>().join(", "),
            self.current_mode().as_str(),
        );

        for entry in &self.entries {
            let name = entry.transport.name().to_string();
            let identity = entry
                .transport
                .verify()
                .await
                .map_err(|e| anyhow::anyhow!("transport {name} failed verification: {e}"))?;
            info!("{name} connected: {identity}");
        }

        let mut pollers = Vec::new();
        for entry in &self.entries {
            let gw = self.clone();
            let transport = entry.transport.clone();
            let cursors = entry.cursors.clone();
            let pace = entry.pace;
            pollers.push(tokio::spawn(async move {
                poll::poll_loop(gw, transport, cursors, pace).await;
            }));
        }

        tokio::signal::ctrl_c().await?;
        info!("received shutdown signal");
        for handle in pollers {
            handle.abort();
        }
        // Pollers stop taking new work; in-flight turns and tasks finish
        // (their own timeouts bound how long this can take).
        self.drain_units().await;
        Ok(())
    }

    /// Register a chat or task unit so shutdown can wait for it. Finished
    /// units are reaped on the way in to keep the set from growing.
    fn spawn_unit(&self, fut: impl Future<Output = ()> + Send + 'static) {
        let mut units = self.units.lock().unwrap_or_else(|e| e.into_inner());
        while units.try_join_next().is_some() {}
        units.spawn(fut);
    }

    /// Wait for every in-flight unit to finish.
    async fn drain_units(&self) {
        let mut units = std::mem::take(
            &mut *self.units.lock().unwrap_or_else(|e| e.into_inner()),
        );
        if !units.is_empty() {
            info!("waiting for {} in-flight unit(s) to finish", units.len());
        }
        while units.join_next().await.is_some() {}
    }

    /// Route one inbound message: auth, commands, then the work classes.
    pub(crate) async fn dispatch(self: &Arc<Self>, msg: InboundMessage) {
        if !self.is_allowed(&msg) {
            debug!(
                "ignoring message from unauthorized user {} on {}",
                msg.sender_id, msg.transport
            );
            return;
        }

        let text = msg.text.trim().to_string();
        if text.is_empty() {
            return;
        }

        info!(
            "message from {} [{}] on {}: {}",
            msg.sender_name.as_deref().unwrap_or(&msg.sender_id),
            msg.sender_id,
            msg.transport,
            msg.preview(80)
        );

        if text.starts_with('/') {
            self.handle_command(&msg, &text).await;
            return;
        }

        match self.current_mode() {
            Mode::Chat => self.queue_chat(msg).await,
            Mode::Task => self.queue_task(msg).await,
        }
    }

    /// Admit a chat turn through the gate and hand it to the chat pool.
    async fn queue_chat(self: &Arc<Self>, msg: InboundMessage) {
        let key = conversation_key(&msg);
        let guard = match self.gate.try_acquire(WorkClass::Chat, &key, msg.preview(80)) {
            Ok(g) => g,
            Err(_) => {
                self.send_notice(&msg, "Still thinking about your previous message…")
                    .await;
                return;
            }
        };

        let gw = self.clone();
        self.spawn_unit(async move {
            let _permit = match gw.chat_permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            gw.chat_turn(&msg).await;
            guard.release();
        });
    }

    /// One backend turn: resume or seed the session, invoke, persist the
    /// new handle, relay the chunked reply.
    async fn chat_turn(&self, msg: &InboundMessage) {
        let transport = match self.transport(&msg.transport) {
            Some(t) => t,
            None => return,
        };
        let key = conversation_key(msg);

        // Keep the typing bubble alive for the full backend call.
        let typing = {
            let transport = transport.clone();
            let conversation = msg.conversation_id.clone();
            tokio::spawn(async move {
                loop {
                    if transport.send_typing(&conversation).await.is_err() {
                        break;
                    }
                    tokio::time::sleep(TYPING_REFRESH).await;
                }
            })
        };

        let handle = self.sessions.get(&key);
        let system_prompt = match (&handle, &self.soul) {
            (None, Some(soul)) => format!("{soul}\n\n{}", self.system_prompt),
            _ => self.system_prompt.clone(),
        };

        let turn = self
            .backend
            .invoke(&msg.text, handle.as_deref(), &self.model, &system_prompt)
            .await;
        typing.abort();

        if let Some(ref new_handle) = turn.resume_handle {
            if handle.as_deref() != Some(new_handle.as_str()) {
                if let Err(e) = self.sessions.set(&key, new_handle) {
                    error!("failed to persist session for {key}: {e}");
                }
            }
        }

        info!(
            "reply for {key} ready in {}ms ({} chars)",
            turn.elapsed_ms,
            turn.reply.chars().count()
        );
        self.send_reply(transport.as_ref(), &msg.conversation_id, &turn.reply)
            .await;
    }

    /// Admit a task through the gate and hand it to the task pool.
    async fn queue_task(self: &Arc<Self>, msg: InboundMessage) {
        let key = conversation_key(&msg);
        let guard = match self.gate.try_acquire(WorkClass::Task, &key, msg.preview(80)) {
            Ok(g) => g,
            Err(running) => {
                self.send_notice(&msg, &format!("A task is already running: {running}"))
                    .await;
                return;
            }
        };

        self.send_notice(&msg, "Task received, working on it...").await;

        let gw = self.clone();
        self.spawn_unit(async move {
            let _permit = match gw.task_permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            let result = gw.runner.run(&msg.text, &msg.conversation_id).await;
            if let Some(transport) = gw.transport(&msg.transport) {
                gw.send_reply(transport.as_ref(), &msg.conversation_id, &result)
                    .await;
            }
            guard.release();
        });
    }

    /// Chunk a reply and send every piece, logging per-chunk failures so
    /// one transient send error drops a chunk, not the whole reply.
    async fn send_reply(&self, transport: &dyn Transport, conversation_id: &str, reply: &str) {
        let chunks = split_reply(reply, transport.message_limit(), LABEL_RESERVE);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            if let Err(e) = transport.send_text(conversation_id, chunk).await {
                error!(
                    "failed to send chunk {}/{total} to {conversation_id}: {e}",
                    i + 1
                );
            }
        }
    }

    /// Best-effort short notice (busy hints, command replies).
    async fn send_notice(&self, msg: &InboundMessage, text: &str) {
        if let Some(transport) = self.transport(&msg.transport) {
            if let Err(e) = transport.send_text(&msg.conversation_id, text).await {
                warn!("failed to send notice to {}: {e}", msg.conversation_id);
            }
        }
    }

    fn is_allowed(&self, msg: &InboundMessage) -> bool {
        match self.allowed.get(&msg.transport) {
            Some(list) if !list.is_empty() => list.contains(&msg.sender_id),
            _ => true,
        }
    }

    fn transport(&self, name: &str) -> Option<&Arc<dyn Transport>> {
        self.by_name.get(name)
    }

    fn current_mode(&self) -> Mode {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
    }
}

/// Gate and session key: conversations are scoped per transport so a
/// Telegram chat 42 never collides with a Teams chat named "42".
fn conversation_key(msg: &InboundMessage) -> String {
    format!("{}:{}", msg.transport, msg.conversation_id)
}

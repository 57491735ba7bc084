//! Gateway behavior tests with in-memory transports and backends.
//!
//! These run on the current-thread runtime, so work spawned by the
//! gateway only progresses once the test awaits — which makes gate
//! admission deterministic to assert on.

use super::poll::process_fetch;
use super::*;
use async_trait::async_trait;
use courier_core::{
    config::{Config, TelegramConfig},
    error::CourierError,
    marker::Marker,
    message::{BackendTurn, InboundMessage},
    traits::Fetch,
};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct MockTransport {
    sent: Mutex<Vec<String>>,
}

impl MockTransport {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    fn message_limit(&self) -> usize {
        4096
    }

    async fn verify(&self) -> Result<String, CourierError> {
        Ok("@mock_bot".into())
    }

    async fn fetch_new(
        &self,
        _cursors: &HashMap<String, Marker>,
    ) -> Result<Fetch, CourierError> {
        Ok(Fetch::default())
    }

    async fn send_text(&self, _conversation_id: &str, text: &str) -> Result<(), CourierError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct MockBackend {
    calls: Mutex<Vec<(String, Option<String>, String)>>,
    reply: String,
}

impl MockBackend {
    fn new(reply: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        }
    }

    fn calls(&self) -> Vec<(String, Option<String>, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        prompt: &str,
        resume_handle: Option<&str>,
        _model: &str,
        system_prompt: &str,
    ) -> BackendTurn {
        self.calls.lock().unwrap().push((
            prompt.to_string(),
            resume_handle.map(String::from),
            system_prompt.to_string(),
        ));
        BackendTurn {
            reply: self.reply.clone(),
            resume_handle: Some("sess-1".into()),
            elapsed_ms: 5,
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct Harness {
    gw: Arc<Gateway>,
    transport: Arc<MockTransport>,
    backend: Arc<MockBackend>,
    cursors: Arc<CursorStore>,
    sessions: Arc<SessionStore>,
    _tmp: tempfile::TempDir,
}

fn harness(allowed: Vec<i64>, mode: &str, soul: Option<&str>) -> Harness {
    let tmp = tempfile::tempdir().unwrap();

    let mut cfg = Config::default();
    cfg.dispatch.mode = mode.to_string();
    cfg.backend.soul_path = tmp.path().join("SOUL.md").display().to_string();
    cfg.tasks.runner_path = tmp.path().join("no-runner.sh").display().to_string();
    cfg.transport.telegram = Some(TelegramConfig {
        enabled: true,
        bot_token: "test-token".into(),
        allowed_users: allowed,
        poll_timeout_secs: 30,
    });
    if let Some(text) = soul {
        std::fs::write(&cfg.backend.soul_path, text).unwrap();
    }

    let transport = Arc::new(MockTransport::default());
    let backend = Arc::new(MockBackend::new("hello from the backend"));
    let cursors = Arc::new(CursorStore::open(tmp.path().join("cursor.json")).unwrap());
    let sessions = Arc::new(SessionStore::open(tmp.path().join("sessions.json")).unwrap());
    let runner = Arc::new(TaskRunner::new(
        cfg.tasks.runner_path.clone(),
        "opus".into(),
        5,
        tmp.path().join("tasks"),
    ));

    let entries = vec![TransportEntry {
        transport: transport.clone() as Arc<dyn Transport>,
        cursors: cursors.clone(),
        pace: Duration::ZERO,
    }];
    let gw = Gateway::new(&cfg, entries, backend.clone(), runner, sessions.clone());

    Harness {
        gw,
        transport,
        backend,
        cursors,
        sessions,
        _tmp: tmp,
    }
}

fn msg(conversation: &str, marker: &str, sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: Uuid::new_v4(),
        transport: "telegram".into(),
        conversation_id: conversation.into(),
        marker: Marker::new(marker),
        sender_id: sender.into(),
        sender_name: None,
        text: text.into(),
        timestamp: chrono::Utc::now(),
    }
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

#[tokio::test]
async fn test_chat_turn_relays_reply_and_saves_session() {
    let h = harness(vec![], "chat", None);
    h.gw.dispatch(msg("42", "100", "7", "hi there")).await;

    let t = h.transport.clone();
    wait_until(move || !t.sent().is_empty()).await;

    assert_eq!(h.transport.sent(), vec!["hello from the backend"]);
    let calls = h.backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "hi there");
    assert_eq!(calls[0].1, None);
    assert_eq!(h.sessions.get("telegram:42").as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_units() {
    let h = harness(vec![], "chat", None);
    h.gw.dispatch(msg("42", "100", "7", "hi there")).await;
    // Current-thread runtime: the admitted unit has not run yet, so the
    // reply can only appear if the drain actually waits for it.
    assert!(h.transport.sent().is_empty());

    h.gw.drain_units().await;

    assert_eq!(h.transport.sent(), vec!["hello from the backend"]);
    assert_eq!(h.sessions.get("telegram:42").as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn test_fresh_session_gets_persona_resumed_does_not() {
    let h = harness(vec![], "chat", Some("PERSONA TEXT"));

    h.gw.dispatch(msg("42", "100", "7", "first")).await;
    let s = h.sessions.clone();
    wait_until(move || s.get("telegram:42").is_some()).await;

    h.gw.dispatch(msg("42", "101", "7", "second")).await;
    let b = h.backend.clone();
    wait_until(move || b.calls().len() == 2).await;

    let calls = h.backend.calls();
    assert!(calls[0].2.starts_with("PERSONA TEXT"));
    assert_eq!(calls[1].1.as_deref(), Some("sess-1"));
    assert!(!calls[1].2.contains("PERSONA TEXT"));
}

#[tokio::test]
async fn test_busy_chat_gets_notice_and_backend_is_not_called() {
    let h = harness(vec![], "chat", None);
    let _slot = h
        .gw
        .gate
        .try_acquire(WorkClass::Chat, "telegram:42", "earlier message")
        .unwrap();

    h.gw.dispatch(msg("42", "100", "7", "impatient follow-up")).await;

    assert_eq!(
        h.transport.sent(),
        vec!["Still thinking about your previous message…"]
    );
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_busy_task_names_the_running_task() {
    let h = harness(vec![], "task", None);
    let _slot = h
        .gw
        .gate
        .try_acquire(WorkClass::Task, "telegram:42", "deploy the site")
        .unwrap();

    h.gw.dispatch(msg("42", "100", "7", "another task please")).await;

    // The second request never reaches the runner.
    assert_eq!(
        h.transport.sent(),
        vec!["A task is already running: deploy the site"]
    );
}

#[tokio::test]
async fn test_task_flow_acknowledges_then_reports_missing_runner() {
    let h = harness(vec![], "task", None);
    h.gw.dispatch(msg("42", "100", "7", "build the report")).await;

    assert_eq!(h.transport.sent(), vec!["Task received, working on it..."]);

    let t = h.transport.clone();
    wait_until(move || t.sent().len() == 2).await;
    assert!(h.transport.sent()[1].contains("task runner not found"));
}

#[tokio::test]
async fn test_unauthorized_sender_is_silently_dropped() {
    let h = harness(vec![7], "chat", None);
    h.gw.dispatch(msg("42", "100", "999", "let me in")).await;

    assert!(h.transport.sent().is_empty());
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_reset_command_clears_the_session() {
    let h = harness(vec![], "chat", None);
    h.sessions.set("telegram:42", "sess-old").unwrap();

    h.gw.dispatch(msg("42", "100", "7", "/reset")).await;

    assert_eq!(h.transport.sent(), vec!["Session reset. Starting fresh."]);
    assert!(h.sessions.get("telegram:42").is_none());
}

#[tokio::test]
async fn test_mode_command_switches_and_validates() {
    let h = harness(vec![], "chat", None);

    h.gw.dispatch(msg("42", "100", "7", "/mode task")).await;
    assert_eq!(h.gw.current_mode(), Mode::Task);

    h.gw.dispatch(msg("42", "101", "7", "/mode bogus")).await;
    assert_eq!(h.gw.current_mode(), Mode::Task);

    let sent = h.transport.sent();
    assert_eq!(sent[0], "Switched to task mode.");
    assert_eq!(sent[1], "Usage: /mode chat | /mode task");
}

#[tokio::test]
async fn test_status_command_reports_counts() {
    let h = harness(vec![], "chat", None);
    h.sessions.set("telegram:42", "sess-1").unwrap();

    h.gw.dispatch(msg("42", "100", "7", "/status")).await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Active sessions: 1"));
    assert!(sent[0].contains("Active tasks: 0"));
    assert!(sent[0].contains("Mode: chat"));
}

#[tokio::test]
async fn test_unknown_command_suggests_help() {
    let h = harness(vec![], "chat", None);
    h.gw.dispatch(msg("42", "100", "7", "/frobnicate now")).await;
    assert_eq!(
        h.transport.sent(),
        vec!["Unknown command: /frobnicate. Try /help."]
    );
}

#[tokio::test]
async fn test_process_fetch_dispatches_ascending_and_persists_cursor() {
    let h = harness(vec![], "chat", None);

    // Batch arrives out of order, for two different conversations.
    let mut fetch = Fetch::default();
    fetch.messages.push(msg("43", "101", "7", "second"));
    fetch.messages.push(msg("42", "100", "7", "first"));
    fetch.cursors.insert("updates".into(), Marker::new("101"));

    process_fetch(&h.gw, &h.cursors, fetch).await;

    // Cursor is durable before any backend work finishes.
    assert_eq!(h.cursors.get("updates"), Some(Marker::new("101")));

    let b = h.backend.clone();
    wait_until(move || b.calls().len() == 2).await;
    // Ascending marker order at dispatch time.
    assert_eq!(h.backend.calls()[0].0, "first");
    assert_eq!(h.backend.calls()[1].0, "second");
}

#[tokio::test]
async fn test_process_fetch_advances_cursor_without_messages() {
    let h = harness(vec![], "chat", None);

    let mut fetch = Fetch::default();
    fetch.cursors.insert("updates".into(), Marker::new("200"));
    process_fetch(&h.gw, &h.cursors, fetch).await;

    assert_eq!(h.cursors.get("updates"), Some(Marker::new("200")));
    assert!(h.backend.calls().is_empty());
}

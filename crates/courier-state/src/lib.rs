//! # courier-state
//!
//! Durable JSON-file state for the relay: the polling cursor
//! (prevents reprocessing messages after a restart) and the session map
//! (binds conversations to backend resume handles so multi-turn context
//! survives restarts).
//!
//! Both stores persist synchronously after every mutation that must
//! survive a restart, via write-temp-then-rename so a crash mid-write
//! never corrupts the previously durable file.

mod file;


pub use file::StateFile;

use courier_core::{error::CourierError, marker::Marker};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Durable mapping `cursor key → highest marker already consumed`.
///
/// Keys are conversation-scoped stream identities chosen by the transport
/// (Teams: one per chat; Telegram: a single global `"updates"` key, since
/// update_ids are bot-global).
pub struct CursorStore {
    file: StateFile,
    map: Mutex<HashMap<String, Marker>>,
}

impl CursorStore {
    /// Open the store, loading prior state if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        let file = StateFile::new(path);
        let raw = file.load()?;
        let map = raw.into_iter().map(|(k, v)| (k, Marker::new(v))).collect();
        Ok(Self {
            file,
            map: Mutex::new(map),
        })
    }

    /// Snapshot of the current cursor map, for handing to a transport fetch.
    pub fn snapshot(&self) -> HashMap<String, Marker> {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Advance the cursor for `key` to `marker` if it is newer, persisting
    /// on change. Returns whether the stored cursor moved. The cursor is
    /// monotonically non-decreasing — an older marker is a no-op.
    pub fn advance(&self, key: &str, marker: Marker) -> Result<bool, CourierError> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(key) {
            Some(current) if *current >= marker => return Ok(false),
            _ => {
                map.insert(key.to_string(), marker);
            }
        }
        self.file.save(
            &map.iter()
                .map(|(k, v)| (k.clone(), v.as_str().to_string()))
                .collect(),
        )?;
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<Marker> {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

/// Durable mapping `conversation id → backend resume handle`.
pub struct SessionStore {
    file: StateFile,
    map: Mutex<HashMap<String, String>>,
}

impl SessionStore {
    /// Open the store, loading prior state if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        let file = StateFile::new(path);
        let map = file.load()?;
        Ok(Self {
            file,
            map: Mutex::new(map),
        })
    }

    pub fn get(&self, conversation_id: &str) -> Option<String> {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned()
    }

    /// Store or replace the resume handle for a conversation, persisting
    /// immediately.
    pub fn set(&self, conversation_id: &str, handle: &str) -> Result<(), CourierError> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(conversation_id.to_string(), handle.to_string());
        self.file.save(&map)
    }

    /// Remove the handle for a conversation (the `/reset` command).
    /// Returns whether an entry existed.
    pub fn clear(&self, conversation_id: &str) -> Result<bool, CourierError> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        let existed = map.remove(conversation_id).is_some();
        if existed {
            self.file.save(&map)?;
        }
        Ok(existed)
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

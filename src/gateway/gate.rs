//! Per-conversation concurrency gate.
//!
//! Each conversation holds at most one in-flight slot per work class. The
//! slot is taken atomically at dispatch time and released when its
//! [`SlotGuard`] drops, so a panicking worker can never wedge a
//! conversation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The two kinds of in-flight work a conversation can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkClass {
    /// Interactive backend turn.
    Chat,
    /// Long-running task via the task runner.
    Task,
}

type Slots = Arc<Mutex<HashMap<(WorkClass, String), String>>>;

/// Tracks which conversations currently have work in flight.
///
/// The classes are independent: a running task does not block a chat turn
/// in the same conversation, only another task.
#[derive(Default)]
pub struct ConversationGate {
    slots: Slots,
}

impl ConversationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `(class, key)`. On success the returned guard
    /// holds the slot until dropped. When the slot is already taken, the
    /// existing occupant's description comes back instead, for the busy
    /// notice.
    pub fn try_acquire(
        &self,
        class: WorkClass,
        key: &str,
        description: impl Into<String>,
    ) -> Result<SlotGuard, String> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot_key = (class, key.to_string());
        if let Some(existing) = slots.get(&slot_key) {
            return Err(existing.clone());
        }
        slots.insert(slot_key, description.into());
        Ok(SlotGuard {
            slots: self.slots.clone(),
            class,
            key: key.to_string(),
        })
    }

    /// Number of occupied slots in a class.
    pub fn active(&self, class: WorkClass) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|(c, _)| *c == class)
            .count()
    }
}

/// RAII handle for an occupied slot. Dropping it frees the conversation
/// for the next message of the same class.
#[derive(Debug)]
pub struct SlotGuard {
    slots: Slots,
    class: WorkClass,
    key: String,
}

impl SlotGuard {
    /// Release the slot explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(self.class, self.key.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_returns_occupant_description() {
        let gate = ConversationGate::new();
        let _guard = gate
            .try_acquire(WorkClass::Task, "telegram:42", "deploy the site")
            .unwrap();

        let busy = gate
            .try_acquire(WorkClass::Task, "telegram:42", "another task")
            .unwrap_err();
        assert_eq!(busy, "deploy the site");
    }

    #[test]
    fn test_classes_are_independent() {
        let gate = ConversationGate::new();
        let _task = gate
            .try_acquire(WorkClass::Task, "telegram:42", "long job")
            .unwrap();

        // A chat turn in the same conversation is still admitted.
        assert!(gate.try_acquire(WorkClass::Chat, "telegram:42", "").is_ok());
    }

    #[test]
    fn test_conversations_are_independent() {
        let gate = ConversationGate::new();
        let _a = gate.try_acquire(WorkClass::Chat, "telegram:42", "").unwrap();
        assert!(gate.try_acquire(WorkClass::Chat, "telegram:43", "").is_ok());
    }

    #[test]
    fn test_drop_frees_the_slot() {
        let gate = ConversationGate::new();
        {
            let _guard = gate.try_acquire(WorkClass::Chat, "teams:a", "").unwrap();
            assert!(gate.try_acquire(WorkClass::Chat, "teams:a", "").is_err());
        }
        assert!(gate.try_acquire(WorkClass::Chat, "teams:a", "").is_ok());
    }

    #[test]
    fn test_explicit_release_frees_the_slot() {
        let gate = ConversationGate::new();
        let guard = gate.try_acquire(WorkClass::Task, "teams:a", "job").unwrap();
        guard.release();
        assert!(gate.try_acquire(WorkClass::Task, "teams:a", "job2").is_ok());
    }

    #[test]
    fn test_active_counts_per_class() {
        let gate = ConversationGate::new();
        let _a = gate.try_acquire(WorkClass::Task, "t:1", "x").unwrap();
        let _b = gate.try_acquire(WorkClass::Task, "t:2", "y").unwrap();
        let _c = gate.try_acquire(WorkClass::Chat, "t:1", "").unwrap();
        assert_eq!(gate.active(WorkClass::Task), 2);
        assert_eq!(gate.active(WorkClass::Chat), 1);
    }
}

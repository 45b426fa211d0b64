//! In-process message log for tests and simulations.

use super::{Message, MessageIdGen, MessageStore};
use crate::error::{Error, Result};
use crate::identity::{ConversationId, PeerId};
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory message log with the same contract as [`super::Database`].
///
/// Shared between both ends of a simulated conversation; appends are
/// atomic under one lock, reads return a snapshot clone.
pub struct MemoryStore {
    logs: Mutex<HashMap<ConversationId, Vec<Message>>>,
    ids: MessageIdGen,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            ids: MessageIdGen::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for MemoryStore {
    fn append_with_flags(
        &self,
        from: &PeerId,
        to: &PeerId,
        text: &str,
        is_system: bool,
        hidden: bool,
    ) -> Result<Message> {
        let message = Message {
            id: self.ids.next(),
            sender: from.clone(),
            text: text.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            is_system,
            hidden,
        };

        let mut logs = self
            .logs
            .lock()
            .map_err(|_| Error::Storage("store lock poisoned".to_string()))?;
        logs.entry(ConversationId::of(from, to))
            .or_default()
            .push(message.clone());

        Ok(message)
    }

    fn read_conversation(&self, a: &PeerId, b: &PeerId) -> Result<Vec<Message>> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| Error::Storage("store lock poisoned".to_string()))?;
        Ok(logs
            .get(&ConversationId::of(a, b))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::codec::SignalPayload;

    #[test]
    fn test_append_order_preserved() {
        let store = MemoryStore::new();
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");

        store.append_message(&alice, &bob, "one").expect("append");
        store.append_signal(&alice, &bob, &SignalPayload::Reject).expect("append");
        store.append_message(&bob, &alice, "two").expect("append");

        let msgs = store.read_conversation(&bob, &alice).expect("read");
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].text, "one");
        assert!(msgs[1].is_system);
        assert_eq!(msgs[2].text, "two");
    }

    #[test]
    fn test_empty_conversation() {
        let store = MemoryStore::new();
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");

        assert!(store.read_conversation(&alice, &bob).expect("read").is_empty());
    }
}

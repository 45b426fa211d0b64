//! The shared message log.
//!
//! One append-only log per conversation carries both user-visible chat
//! text and hidden signaling payloads. Appends are single atomic writes;
//! readers get a full snapshot in append order and never mutate the log.
//! The state machine relies on append order, not wall-clock order.

mod database;
mod memory;

pub use database::{Database, DatabaseConfig};
pub use memory::MemoryStore;

use crate::error::Result;
use crate::identity::PeerId;
use crate::signal::codec::{self, SignalPayload};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "aviary.db";

/// Unique, time-based, monotonically assigned message identifier.
///
/// Assigned by the store at append time; used by observers for
/// de-duplication, never for ordering across peers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, assigned by the store.
    pub id: MessageId,
    /// Identity of the originating peer.
    pub sender: PeerId,
    /// Message text; signaling payloads carry the signal prefix.
    pub text: String,
    /// Emission time (Unix millis). Newest-wins comparisons only.
    pub timestamp: i64,
    /// System-generated (not typed by a user).
    pub is_system: bool,
    /// Excluded from the rendered transcript.
    pub hidden: bool,
}

impl Message {
    /// Whether this message belongs in the rendered transcript.
    pub fn is_visible(&self) -> bool {
        !self.hidden && !self.is_system
    }

    /// Decode this message's text as a signaling payload, if it is one.
    pub fn signal(&self) -> Option<SignalPayload> {
        codec::decode(&self.text)
    }
}

/// The persistence collaborator: an append-only per-conversation log
/// shared by both ends of a peer pair.
pub trait MessageStore: Send + Sync {
    /// Append one entry with explicit flags. A single atomic write.
    fn append_with_flags(
        &self,
        from: &PeerId,
        to: &PeerId,
        text: &str,
        is_system: bool,
        hidden: bool,
    ) -> Result<Message>;

    /// Full snapshot of the conversation between `a` and `b`, in append
    /// order.
    fn read_conversation(&self, a: &PeerId, b: &PeerId) -> Result<Vec<Message>>;

    /// Append a user-visible chat message.
    fn append_message(&self, from: &PeerId, to: &PeerId, text: &str) -> Result<Message> {
        self.append_with_flags(from, to, text, false, false)
    }

    /// Append an encoded signaling payload, marked system and hidden so
    /// it never surfaces in the transcript. Fire-and-forget.
    fn append_signal(
        &self,
        from: &PeerId,
        to: &PeerId,
        payload: &SignalPayload,
    ) -> Result<Message> {
        let text = codec::encode(payload)?;
        self.append_with_flags(from, to, &text, true, true)
    }
}

/// Time-based, collision-bumping identifier generator shared by the
/// store implementations.
///
/// Identifiers are `max(now_millis, last + 1)`, so they stay unique and
/// monotone per store even when appends land in the same millisecond.
pub(crate) struct MessageIdGen {
    last: AtomicI64,
}

impl MessageIdGen {
    pub(crate) fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Seed the generator so newly assigned ids stay above `floor`.
    pub(crate) fn seed(&self, floor: i64) {
        self.last.fetch_max(floor, Ordering::SeqCst);
    }

    pub(crate) fn next(&self) -> MessageId {
        let now = chrono::Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return MessageId(next),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_gen_monotonic() {
        let gen = MessageIdGen::new();
        let a = gen.next();
        let b = gen.next();
        let c = gen.next();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_id_gen_seed() {
        let gen = MessageIdGen::new();
        let far_future = chrono::Utc::now().timestamp_millis() + 1_000_000;
        gen.seed(far_future);
        assert_eq!(gen.next(), MessageId(far_future + 1));
    }
}

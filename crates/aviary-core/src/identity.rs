//! Peer and conversation identifiers.
//!
//! Peers are identified by their account identifier (an email-style
//! string). A conversation between two peers is keyed by the sorted pair
//! of identifiers, so both ends derive the same key independently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a peer (their account identifier).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Canonical key for the shared message log of a peer pair.
///
/// The two identifiers sorted and joined with `_`; symmetric, so
/// `of(a, b) == of(b, a)`. A self-conversation (`a == a`) is a valid key
/// and carries self-call signaling.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Derive the conversation key for a peer pair.
    pub fn of(a: &PeerId, b: &PeerId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() { (a, b) } else { (b, a) };
        Self(format!("{}_{}", lo.as_str(), hi.as_str()))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationId({})", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_symmetric() {
        let a = PeerId::new("alice@example.com");
        let b = PeerId::new("bob@example.com");

        assert_eq!(ConversationId::of(&a, &b), ConversationId::of(&b, &a));
        assert_eq!(
            ConversationId::of(&a, &b).as_str(),
            "alice@example.com_bob@example.com"
        );
    }

    #[test]
    fn test_self_conversation() {
        let a = PeerId::new("alice@example.com");
        let id = ConversationId::of(&a, &a);
        assert_eq!(id.as_str(), "alice@example.com_alice@example.com");
    }
}

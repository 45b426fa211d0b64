//! Logging helpers with account-identifier redaction.
//!
//! Peer identifiers are email-style addresses and should not appear in
//! full in log output. These wrappers are used at `tracing` call sites.

use crate::identity::PeerId;
use std::fmt;

/// Redact a peer identifier, showing only a short prefix.
pub struct RedactedPeer<'a>(pub &'a PeerId);

impl<'a> fmt::Display for RedactedPeer<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Identifiers are arbitrary UTF-8, so truncate by character,
        // never by byte offset.
        let s = self.0.as_str();
        if s.chars().count() > 6 {
            for c in s.chars().take(4) {
                write!(f, "{c}")?;
            }
            f.write_str("...")
        } else {
            f.write_str("[PEER]")
        }
    }
}

impl<'a> fmt::Debug for RedactedPeer<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_peer() {
        let peer = PeerId::new("alice@example.com");
        let displayed = format!("{}", RedactedPeer(&peer));
        assert_eq!(displayed, "alic...");

        let short = PeerId::new("a@b");
        assert_eq!(format!("{}", RedactedPeer(&short)), "[PEER]");
    }

    #[test]
    fn test_redacted_peer_multibyte_identifier() {
        // Internationalized addresses put multi-byte characters inside
        // the truncation window; redaction must not split them.
        let peer = PeerId::new("abcé@example.com");
        assert_eq!(format!("{}", RedactedPeer(&peer)), "abcé...");

        let all_multibyte = PeerId::new("áéíóúñ@example.com");
        assert_eq!(format!("{}", RedactedPeer(&all_multibyte)), "áéíó...");
    }
}

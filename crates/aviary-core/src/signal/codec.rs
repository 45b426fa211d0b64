//! Signal payload wire codec.
//!
//! Signals travel inside ordinary chat messages: the text field carries
//! `"CALL_SIGNAL:" + JSON({type, ...})`. The prefix is the only bit-exact
//! contract at the persistence boundary; anything that wants to
//! interoperate with the shared message stream must preserve it.
//!
//! Decoding is deliberately infallible-looking: [`decode`] returns `None`
//! for anything that is not a well-formed signal, so callers can use it
//! as a cheap filter over mixed chat/signal streams.

use crate::call::media::MediaMode;
use crate::call::peer::{IceCandidate, SessionDescription};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Stable prefix marking a message text as a signaling payload.
pub const SIGNAL_PREFIX: &str = "CALL_SIGNAL:";

/// A call signaling payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    /// The caller's half of the description exchange.
    Offer {
        /// The caller's session description.
        sdp: SessionDescription,
        /// Requested media mode; absent on the wire means audio.
        #[serde(default)]
        media: MediaMode,
    },
    /// The callee's half of the description exchange.
    Answer {
        /// The callee's session description.
        sdp: SessionDescription,
    },
    /// A connectivity option discovered by one side.
    Candidate {
        /// The candidate to attempt.
        candidate: IceCandidate,
    },
    /// The callee declined the pending offer.
    Reject,
}

impl SignalPayload {
    /// Whether this payload is an offer.
    pub fn is_offer(&self) -> bool {
        matches!(self, SignalPayload::Offer { .. })
    }
}

/// Encode a payload into message text carrying the signal prefix.
pub fn encode(payload: &SignalPayload) -> Result<String> {
    let body = serde_json::to_string(payload)?;
    Ok(format!("{SIGNAL_PREFIX}{body}"))
}

/// Decode message text into a payload.
///
/// Returns `None` if the prefix is absent or the body fails to parse;
/// both are routine for ordinary chat messages sharing the stream.
pub fn decode(text: &str) -> Option<SignalPayload> {
    let body = text.strip_prefix(SIGNAL_PREFIX)?;
    serde_json::from_str(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let payload = SignalPayload::Offer {
            sdp: SessionDescription::offer("v=0 test"),
            media: MediaMode::Video,
        };

        let text = encode(&payload).unwrap();
        assert!(text.starts_with(SIGNAL_PREFIX));

        let decoded = decode(&text).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_filters_chat_text() {
        assert_eq!(decode("hello there"), None);
        assert_eq!(decode(""), None);
        // Prefix present but body is garbage: still None, never an error.
        assert_eq!(decode("CALL_SIGNAL:{not json"), None);
        assert_eq!(decode("CALL_SIGNAL:{\"type\":\"unknown\"}"), None);
    }

    #[test]
    fn test_offer_without_media_defaults_to_audio() {
        let text = r#"CALL_SIGNAL:{"type":"offer","sdp":{"type":"offer","sdp":"v=0"}}"#;
        match decode(text) {
            Some(SignalPayload::Offer { media, .. }) => assert_eq!(media, MediaMode::Audio),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_wire_shape() {
        let text = encode(&SignalPayload::Reject).unwrap();
        assert_eq!(text, r#"CALL_SIGNAL:{"type":"reject"}"#);

        let cand = SignalPayload::Candidate {
            candidate: IceCandidate::new("candidate:1"),
        };
        let text = encode(&cand).unwrap();
        assert_eq!(
            text,
            r#"CALL_SIGNAL:{"type":"candidate","candidate":{"candidate":"candidate:1"}}"#
        );
    }
}

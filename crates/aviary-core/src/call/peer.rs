//! Peer connection abstraction.
//!
//! The session machine drives a WebRTC-style connection primitive through
//! these seams: it asks for local descriptions, applies remote ones, and
//! feeds in remote ICE candidates, while the connection reports its own
//! discoveries (local candidates, remote media arrival) on an event
//! channel. Exactly one connection exists per call session and it is
//! never reused.

use crate::call::media::MediaStream;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Which half of the description exchange a description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// The caller's half.
    Offer,
    /// The callee's half.
    Answer,
}

/// A session description, serialized in the WebRTC JSON shape
/// (`{"type": "offer", "sdp": "..."}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer.
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// The description body.
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A connectivity option proposed by one peer for the other to attempt,
/// serialized in the WebRTC JSON shape (`sdpMid`, `sdpMLineIndex`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// The candidate line.
    pub candidate: String,
    /// Media stream identification tag, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description this candidate belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
}

impl IceCandidate {
    /// Create a candidate from its line, without media association.
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Events a peer connection reports back to its owning session.
#[derive(Debug)]
pub enum PeerEvent {
    /// A local connectivity option was discovered; the session relays it
    /// to the far side through the signal log.
    LocalCandidate(IceCandidate),
    /// The far side's tracks arrived.
    RemoteStream(MediaStream),
}

/// A WebRTC-style connection owned by one call session.
#[async_trait]
pub trait PeerConnection: Send {
    /// Attach local capture tracks to the connection.
    async fn add_stream(&mut self, stream: &MediaStream) -> Result<()>;

    /// Produce the local offer description.
    async fn create_offer(&mut self) -> Result<SessionDescription>;

    /// Produce the local answer description to a previously applied
    /// remote offer.
    async fn create_answer(&mut self) -> Result<SessionDescription>;

    /// Apply the far side's description (offer or answer).
    async fn set_remote_description(&mut self, desc: &SessionDescription) -> Result<()>;

    /// Attempt a connectivity option proposed by the far side.
    ///
    /// Failures are non-fatal to the session; more candidates are
    /// expected.
    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()>;

    /// Tear the connection down. Effective immediately; safe to call
    /// more than once.
    fn close(&mut self);
}

/// Factory for peer connections.
///
/// Produces the connection together with the receiving end of its event
/// channel; the session drains that receiver cooperatively.
pub trait PeerConnector: Send + Sync {
    /// Create a fresh connection for one call session.
    fn connect(&self) -> Result<(Box<dyn PeerConnection>, mpsc::Receiver<PeerEvent>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_json_shape() {
        let desc = SessionDescription::offer("v=0");
        let json = serde_json::to_value(&desc).unwrap();

        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0");
    }

    #[test]
    fn test_candidate_json_shape() {
        let cand = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.0.2.1 54400 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        let json = serde_json::to_value(&cand).unwrap();

        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);

        // Bare candidates omit the association fields entirely.
        let bare = serde_json::to_value(IceCandidate::new("candidate:1")).unwrap();
        assert!(bare.get("sdpMid").is_none());
    }
}

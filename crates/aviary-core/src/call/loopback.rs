//! In-process peer connection backend.
//!
//! Stands in for a real transport in tests, simulations, and the CLI
//! demo. Descriptions are synthetic but structurally honest: each one
//! carries the producing connection's random tag and one `m=` line per
//! attached track kind, so applying a description reconstructs the far
//! side's media shape, and a connection can recognize its own
//! description coming back (the signature of a self-addressed call).

use crate::call::media::{MediaStream, MediaTrack, TrackKind};
use crate::call::peer::{
    IceCandidate, PeerConnection, PeerConnector, PeerEvent, SdpKind, SessionDescription,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Factory for [`LoopbackPeer`] connections.
#[derive(Debug, Clone, Default)]
pub struct LoopbackConnector;

impl LoopbackConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

impl PeerConnector for LoopbackConnector {
    fn connect(&self) -> Result<(Box<dyn PeerConnection>, mpsc::Receiver<PeerEvent>)> {
        let (tx, rx) = mpsc::channel(16);
        let tag = format!("{:08x}", rand::random::<u32>());
        debug!(%tag, "created loopback peer connection");
        Ok((
            Box::new(LoopbackPeer {
                tag,
                local: None,
                remote: None,
                closed: false,
                events: tx,
            }),
            rx,
        ))
    }
}

/// One end of an in-process connection.
pub struct LoopbackPeer {
    tag: String,
    local: Option<MediaStream>,
    remote: Option<SessionDescription>,
    closed: bool,
    events: mpsc::Sender<PeerEvent>,
}

impl LoopbackPeer {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Peer("connection is closed".to_string()));
        }
        Ok(())
    }

    fn describe(&self, kind: SdpKind) -> SessionDescription {
        let mut sdp = format!("v=0 loopback:{}\r\nm=audio\r\n", self.tag);
        if self.local.as_ref().is_some_and(MediaStream::has_video) {
            sdp.push_str("m=video\r\n");
        }
        SessionDescription { kind, sdp }
    }

    fn emit(&self, event: PeerEvent) {
        // Dropped events mean the session stopped draining; that only
        // happens during teardown.
        let _ = self.events.try_send(event);
    }

    fn stream_from_sdp(sdp: &str) -> MediaStream {
        let mut tracks = vec![MediaTrack::new(TrackKind::Audio)];
        if sdp.contains("m=video") {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }
        MediaStream::new(tracks)
    }
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    async fn add_stream(&mut self, stream: &MediaStream) -> Result<()> {
        self.ensure_open()?;
        self.local = Some(stream.clone());
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        self.ensure_open()?;
        let desc = self.describe(SdpKind::Offer);
        self.emit(PeerEvent::LocalCandidate(IceCandidate::new(format!(
            "candidate:loopback {} typ host",
            self.tag
        ))));
        Ok(desc)
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        self.ensure_open()?;
        if self.remote.is_none() {
            return Err(Error::InvalidState(
                "answer requested before a remote offer was applied".to_string(),
            ));
        }
        let desc = self.describe(SdpKind::Answer);
        self.emit(PeerEvent::LocalCandidate(IceCandidate::new(format!(
            "candidate:loopback {} typ host",
            self.tag
        ))));
        Ok(desc)
    }

    async fn set_remote_description(&mut self, desc: &SessionDescription) -> Result<()> {
        self.ensure_open()?;
        if desc.sdp.contains(&self.tag) {
            // Our own description came back around the log.
            return Err(Error::Peer(
                "remote description was produced by this connection".to_string(),
            ));
        }
        self.remote = Some(desc.clone());
        self.emit(PeerEvent::RemoteStream(Self::stream_from_sdp(&desc.sdp)));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        self.ensure_open()?;
        debug!(candidate = %candidate.candidate, "applied remote candidate");
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.local = None;
        self.remote = None;
    }
}

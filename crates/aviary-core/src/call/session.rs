//! The call session state machine.
//!
//! One [`CallSession`] exists per open conversation view. It consumes
//! signals surfaced by the conversation poller, drives the peer
//! connection and local media through their trait seams, and exposes the
//! state the UI renders. Every transition happens on the observing side's
//! own schedule; the far side learns about it only through signals
//! appended to the shared log.
//!
//! Failure policy follows the capture hierarchy: losing the camera
//! degrades the call to audio with an advisory status, losing the
//! microphone kills the attempt. Neither surfaces as an `Err` to the
//! caller; the session resolves media failures into state so the UI
//! always has something coherent to render.

use crate::call::media::{MediaDevices, MediaMode, MediaStream};
use crate::call::peer::{PeerConnection, PeerConnector, PeerEvent, SessionDescription};
use crate::error::{Error, Result};
use crate::identity::PeerId;
use crate::logging::RedactedPeer;
use crate::signal::codec::SignalPayload;
use crate::storage::MessageStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Advisory shown when the camera fails and the call degrades to audio.
pub const VIDEO_FALLBACK_NOTICE: &str = "Could not start video source. Falling back to audio.";

/// Status shown when no microphone can be acquired.
pub const AUDIO_UNAVAILABLE_NOTICE: &str = "Audio input unavailable.";

/// Status shown when the far side declines an outgoing offer.
pub const CALL_DECLINED_NOTICE: &str = "Call declined";

/// Hidden log line recording that an answered call finished.
const CALL_ENDED_MARKER: &str = "call ended";

/// Lifecycle of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    /// No call in progress.
    #[default]
    Idle,
    /// We sent an offer and are waiting for the far side.
    OutgoingOffered,
    /// The far side's offer is pending our decision.
    IncomingOffered,
    /// Both descriptions applied; media flowing.
    Connected,
    /// The attempt failed locally (no microphone, connection failure).
    Error,
    /// The far side declined, or the call was torn down remotely.
    Closed,
}

impl CallState {
    /// Whether a new outgoing call may start from this state.
    fn can_start(self) -> bool {
        matches!(self, CallState::Idle | CallState::Error | CallState::Closed)
    }

    /// Whether a connection exists or is being negotiated.
    fn is_active(self) -> bool {
        matches!(
            self,
            CallState::OutgoingOffered | CallState::IncomingOffered | CallState::Connected
        )
    }
}

/// A remote offer waiting for the local user's decision.
#[derive(Debug, Clone)]
pub struct PendingIncomingCall {
    /// The offering peer.
    pub from: PeerId,
    /// Requested media mode.
    pub media: MediaMode,
    /// The offer description to apply on accept.
    pub sdp: SessionDescription,
}

/// Per-conversation call state machine.
pub struct CallSession {
    me: PeerId,
    peer: PeerId,
    store: Arc<dyn MessageStore>,
    devices: Arc<dyn MediaDevices>,
    connector: Arc<dyn PeerConnector>,
    state: CallState,
    mode: Option<MediaMode>,
    local: Option<MediaStream>,
    remote: Option<MediaStream>,
    pc: Option<Box<dyn PeerConnection>>,
    pc_events: Option<mpsc::Receiver<PeerEvent>>,
    pending_offers: HashMap<PeerId, PendingIncomingCall>,
    call_error: Option<String>,
    muted: bool,
    camera_on: bool,
}

impl CallSession {
    /// Create an idle session for the conversation between `me` and
    /// `peer`.
    pub fn new(
        me: PeerId,
        peer: PeerId,
        store: Arc<dyn MessageStore>,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
    ) -> Self {
        Self {
            me,
            peer,
            store,
            devices,
            connector,
            state: CallState::Idle,
            mode: None,
            local: None,
            remote: None,
            pc: None,
            pc_events: None,
            pending_offers: HashMap::new(),
            call_error: None,
            muted: false,
            camera_on: true,
        }
    }

    /// Whether this conversation is the local identity talking to itself.
    pub fn is_self_call(&self) -> bool {
        self.me == self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Media mode the session actually captured, once a call is under
    /// way.
    pub fn mode(&self) -> Option<MediaMode> {
        self.mode
    }

    /// Advisory or failure status for the UI, if any.
    pub fn call_error(&self) -> Option<&str> {
        self.call_error.as_deref()
    }

    /// Local capture tracks, while a call holds them.
    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local.as_ref()
    }

    /// The far side's tracks, once they arrived.
    pub fn remote_stream(&self) -> Option<&MediaStream> {
        self.remote.as_ref()
    }

    /// Whether the microphone is muted.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Whether the camera is enabled.
    pub fn camera_on(&self) -> bool {
        self.camera_on
    }

    /// The pending offer from `from`, if one awaits a decision.
    pub fn pending_offer(&self, from: &PeerId) -> Option<&PendingIncomingCall> {
        self.pending_offers.get(from)
    }

    /// Whether any offer awaits a decision.
    pub fn has_pending_offer(&self) -> bool {
        !self.pending_offers.is_empty()
    }

    /// Capture local media for `mode`, degrading video to audio when the
    /// camera fails. A microphone failure is fatal to the attempt.
    async fn acquire_media(&mut self, mode: MediaMode) -> Result<(MediaStream, MediaMode)> {
        if mode.has_video() {
            match self.devices.capture(MediaMode::Video).await {
                Ok(stream) => return Ok((stream, MediaMode::Video)),
                Err(e) => {
                    warn!(error = %e, "camera capture failed, degrading to audio");
                    self.call_error = Some(VIDEO_FALLBACK_NOTICE.to_string());
                }
            }
        }
        let stream = self.devices.capture(MediaMode::Audio).await?;
        Ok((stream, MediaMode::Audio))
    }

    /// Abort the current attempt after a local failure, releasing
    /// whatever was already acquired.
    fn fail(&mut self, status: String) {
        warn!(status = %status, "call attempt failed");
        self.release();
        self.call_error = Some(status);
        self.state = CallState::Error;
    }

    /// Release media and the connection without touching state flags.
    fn release(&mut self) {
        if let Some(stream) = self.local.as_mut() {
            stream.stop_all();
        }
        if let Some(stream) = self.remote.as_mut() {
            stream.stop_all();
        }
        if let Some(pc) = self.pc.as_mut() {
            pc.close();
        }
        self.local = None;
        self.remote = None;
        self.pc = None;
        self.pc_events = None;
        self.mode = None;
    }

    /// Start an outgoing call.
    ///
    /// Captures local media first, so the offer on the wire advertises
    /// the mode that was actually acquired, then appends the offer
    /// signal. Media and connection failures resolve into the `Error`
    /// state rather than an `Err`; only a prior active call is an error
    /// to the caller.
    pub async fn start_call(&mut self, mode: MediaMode) -> Result<()> {
        if !self.state.can_start() {
            return Err(Error::InvalidState(format!(
                "cannot start a call while {:?}",
                self.state
            )));
        }
        self.call_error = None;

        let (mut pc, rx) = match self.connector.connect() {
            Ok(pair) => pair,
            Err(e) => {
                self.fail(e.to_string());
                return Ok(());
            }
        };

        let (stream, captured) = match self.acquire_media(mode).await {
            Ok(captured) => captured,
            Err(_) => {
                self.fail(AUDIO_UNAVAILABLE_NOTICE.to_string());
                return Ok(());
            }
        };

        if let Err(e) = pc.add_stream(&stream).await {
            self.fail(e.to_string());
            return Ok(());
        }
        let offer = match pc.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                self.fail(e.to_string());
                return Ok(());
            }
        };

        self.local = Some(stream);
        self.pc = Some(pc);
        self.pc_events = Some(rx);
        self.mode = Some(captured);

        if let Err(e) = self.store.append_signal(
            &self.me,
            &self.peer,
            &SignalPayload::Offer {
                sdp: offer,
                media: captured,
            },
        ) {
            self.fail(e.to_string());
            return Ok(());
        }

        info!(
            peer = %RedactedPeer(&self.peer),
            mode = %captured,
            "outgoing call offered"
        );
        self.state = CallState::OutgoingOffered;
        Ok(())
    }

    /// Apply one signal observed in the conversation log.
    ///
    /// Echoes of our own signals are skipped, except in a self-addressed
    /// conversation where the echo is the only way the "far side" can
    /// ring.
    pub async fn handle_signal(&mut self, from: &PeerId, payload: SignalPayload) -> Result<()> {
        if *from == self.me && !self.is_self_call() {
            return Ok(());
        }
        match payload {
            SignalPayload::Offer { sdp, media } => self.handle_offer(from, sdp, media),
            SignalPayload::Answer { sdp } => self.handle_answer(&sdp).await,
            SignalPayload::Candidate { candidate } => {
                if self.state.is_active() {
                    if let Some(pc) = self.pc.as_mut() {
                        if let Err(e) = pc.add_ice_candidate(&candidate).await {
                            debug!(error = %e, "remote candidate rejected");
                        }
                    }
                }
                Ok(())
            }
            SignalPayload::Reject => {
                self.handle_reject();
                Ok(())
            }
        }
    }

    fn handle_offer(&mut self, from: &PeerId, sdp: SessionDescription, media: MediaMode) -> Result<()> {
        info!(
            from = %RedactedPeer(from),
            mode = %media,
            "incoming call offer"
        );
        // A newer offer from the same peer supersedes its predecessor;
        // offers from distinct peers queue independently.
        self.pending_offers.insert(
            from.clone(),
            PendingIncomingCall {
                from: from.clone(),
                media,
                sdp,
            },
        );
        if self.state == CallState::Idle {
            self.state = CallState::IncomingOffered;
        }
        Ok(())
    }

    async fn handle_answer(&mut self, sdp: &SessionDescription) -> Result<()> {
        if self.state != CallState::OutgoingOffered {
            debug!(state = ?self.state, "answer ignored outside outgoing offer");
            return Ok(());
        }
        let Some(pc) = self.pc.as_mut() else {
            return Ok(());
        };
        match pc.set_remote_description(sdp).await {
            Ok(()) => {
                info!(peer = %RedactedPeer(&self.peer), "call connected");
                self.state = CallState::Connected;
            }
            Err(e) => {
                // Answer application failing is not fatal; the offer
                // stands and another answer may still land.
                warn!(error = %e, "failed to apply answer");
                self.call_error = Some(e.to_string());
            }
        }
        Ok(())
    }

    fn handle_reject(&mut self) {
        if self.state != CallState::OutgoingOffered {
            return;
        }
        info!(peer = %RedactedPeer(&self.peer), "call declined by peer");
        self.release();
        self.call_error = Some(CALL_DECLINED_NOTICE.to_string());
        self.state = CallState::Closed;
    }

    /// Accept the pending offer from `from`.
    ///
    /// Media is captured only now, on the callee's explicit decision. In
    /// a self-addressed conversation the connection created by
    /// [`start_call`](Self::start_call) is reused and the (impossible)
    /// remote-description application is tolerated, yielding a local-only
    /// connected call.
    pub async fn accept_incoming(&mut self, from: &PeerId) -> Result<()> {
        let pending = self.pending_offers.remove(from).ok_or(Error::NoCall)?;

        if self.pc.is_none() {
            let (pc, rx) = match self.connector.connect() {
                Ok(pair) => pair,
                Err(e) => {
                    self.fail(e.to_string());
                    return Ok(());
                }
            };
            self.pc = Some(pc);
            self.pc_events = Some(rx);

            let (stream, captured) = match self.acquire_media(pending.media).await {
                Ok(captured) => captured,
                Err(_) => {
                    self.fail(AUDIO_UNAVAILABLE_NOTICE.to_string());
                    return Ok(());
                }
            };
            if let Some(pc) = self.pc.as_mut() {
                if let Err(e) = pc.add_stream(&stream).await {
                    self.fail(e.to_string());
                    return Ok(());
                }
            }
            self.local = Some(stream);
            self.mode = Some(captured);
        }

        let Some(pc) = self.pc.as_mut() else {
            return Err(Error::InvalidState("no connection to accept on".to_string()));
        };

        match pc.set_remote_description(&pending.sdp).await {
            Ok(()) => {
                let answer = match pc.create_answer().await {
                    Ok(answer) => answer,
                    Err(e) => {
                        self.fail(e.to_string());
                        return Ok(());
                    }
                };
                if let Err(e) =
                    self.store
                        .append_signal(&self.me, &self.peer, &SignalPayload::Answer { sdp: answer })
                {
                    self.fail(e.to_string());
                    return Ok(());
                }
                info!(peer = %RedactedPeer(&self.peer), "incoming call accepted");
                self.state = CallState::Connected;
            }
            Err(e) if self.is_self_call() => {
                // Feeding a connection its own offer back cannot work;
                // a self-addressed call connects locally regardless.
                debug!(error = %e, "self-addressed offer tolerated");
                self.state = CallState::Connected;
            }
            Err(e) => {
                warn!(error = %e, "failed to apply incoming offer");
                self.call_error = Some(e.to_string());
            }
        }
        Ok(())
    }

    /// Decline the pending offer from `from`.
    ///
    /// Appends a reject signal for the caller and drops the pending
    /// entry. Declining an offer that is no longer pending is a no-op.
    pub fn reject_incoming(&mut self, from: &PeerId) -> Result<()> {
        if self.pending_offers.remove(from).is_none() {
            return Ok(());
        }
        self.store
            .append_signal(&self.me, &self.peer, &SignalPayload::Reject)?;
        info!(from = %RedactedPeer(from), "incoming call declined");
        if self.state == CallState::IncomingOffered && self.pending_offers.is_empty() {
            self.state = CallState::Idle;
        }
        Ok(())
    }

    /// Adopt an offer that was noticed globally before this conversation
    /// was opened, so the session rings without waiting for its own
    /// poller pass.
    pub fn adopt_handoff(&mut self, pending: PendingIncomingCall) {
        self.pending_offers.insert(pending.from.clone(), pending);
        if self.state == CallState::Idle {
            self.state = CallState::IncomingOffered;
        }
    }

    /// Tear the call down unconditionally and return to idle.
    ///
    /// Synchronous and infallible from the caller's point of view: media
    /// is released, the connection closed, and toggles reset no matter
    /// what state the session was in. An answered call leaves one hidden
    /// marker line in the log.
    pub fn end_call(&mut self) {
        if self.state == CallState::Connected {
            if let Err(e) =
                self.store
                    .append_with_flags(&self.me, &self.peer, CALL_ENDED_MARKER, true, true)
            {
                warn!(error = %e, "failed to record call end");
            }
        }
        info!(peer = %RedactedPeer(&self.peer), "call ended");
        self.release();
        self.call_error = None;
        self.muted = false;
        self.camera_on = true;
        self.state = CallState::Idle;
    }

    /// Toggle the microphone. Returns the new muted flag.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        if let Some(stream) = self.local.as_mut() {
            stream.set_audio_enabled(!self.muted);
        }
        self.muted
    }

    /// Toggle the camera. Returns the new camera flag.
    pub fn toggle_camera(&mut self) -> bool {
        self.camera_on = !self.camera_on;
        if let Some(stream) = self.local.as_mut() {
            stream.set_video_enabled(self.camera_on);
        }
        self.camera_on
    }

    /// Drain pending connection events cooperatively.
    ///
    /// Local candidates are relayed through the signal log; the remote
    /// stream's arrival is recorded for rendering. Call between poller
    /// passes.
    pub fn pump_events(&mut self) {
        let Some(rx) = self.pc_events.as_mut() else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            match event {
                PeerEvent::LocalCandidate(candidate) => {
                    if let Err(e) = self.store.append_signal(
                        &self.me,
                        &self.peer,
                        &SignalPayload::Candidate { candidate },
                    ) {
                        warn!(error = %e, "failed to relay local candidate");
                    }
                }
                PeerEvent::RemoteStream(stream) => {
                    debug!("remote media arrived");
                    self.remote = Some(stream);
                    if matches!(
                        self.state,
                        CallState::OutgoingOffered | CallState::IncomingOffered
                    ) {
                        self.state = CallState::Connected;
                    }
                }
            }
        }
    }
}

//! Local media capture primitives.
//!
//! A [`MediaStream`] is exclusively owned by the call session that
//! acquired it and is released synchronously on teardown. Device
//! availability is modelled as a capability-check result consumed before
//! acquisition, so the session machine branches on data rather than on
//! caught exceptions alone.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested call media mode.
///
/// An offer without an explicit mode is treated as audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Voice only.
    #[default]
    Audio,
    /// Camera plus voice.
    Video,
}

impl MediaMode {
    /// Whether this mode requires a camera.
    pub fn has_video(self) -> bool {
        matches!(self, MediaMode::Video)
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaMode::Audio => f.write_str("audio"),
            MediaMode::Video => f.write_str("video"),
        }
    }
}

/// Kind of a captured media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone track.
    Audio,
    /// Camera track.
    Video,
}

/// A single captured device track.
///
/// Disabling a track (mute, camera off) keeps the device handle;
/// stopping releases it for good.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    kind: TrackKind,
    enabled: bool,
    stopped: bool,
}

impl MediaTrack {
    /// Create a live, enabled track.
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            enabled: true,
            stopped: false,
        }
    }

    /// Track kind.
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Whether the track is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the track without releasing the device.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Release the underlying device handle.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.enabled = false;
    }

    /// Whether the track has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// A set of captured tracks owned by one call session.
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// Create a stream from tracks.
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    /// Create the track set for a requested mode.
    pub fn for_mode(mode: MediaMode) -> Self {
        let mut tracks = vec![MediaTrack::new(TrackKind::Audio)];
        if mode.has_video() {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }
        Self { tracks }
    }

    /// All tracks.
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Whether the stream carries a camera track.
    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }

    /// Whether any track is still live.
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| !t.is_stopped())
    }

    /// Enable or disable all microphone tracks (mute toggle).
    pub fn set_audio_enabled(&mut self, enabled: bool) {
        for track in self.tracks.iter_mut().filter(|t| t.kind() == TrackKind::Audio) {
            track.set_enabled(enabled);
        }
    }

    /// Enable or disable all camera tracks (camera toggle).
    pub fn set_video_enabled(&mut self, enabled: bool) {
        for track in self.tracks.iter_mut().filter(|t| t.kind() == TrackKind::Video) {
            track.set_enabled(enabled);
        }
    }

    /// Release every device handle.
    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
    }
}

/// Result of a device capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCapability {
    /// The requested devices can be acquired.
    Available,
    /// The requested devices cannot be acquired.
    Unavailable {
        /// Human-readable reason.
        reason: String,
    },
}

impl MediaCapability {
    /// Whether acquisition can proceed.
    pub fn is_available(&self) -> bool {
        matches!(self, MediaCapability::Available)
    }
}

/// Platform media capture capability.
///
/// Implemented by the environment (a browser binding, an OS capture
/// layer, or [`SimulatedDevices`] in tests and simulations).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Check whether the devices for `mode` can be acquired.
    async fn capability(&self, mode: MediaMode) -> MediaCapability;

    /// Acquire local tracks for `mode`.
    async fn capture(&self, mode: MediaMode) -> Result<MediaStream>;
}

/// Deterministic device backend with per-kind grants.
#[derive(Debug, Clone)]
pub struct SimulatedDevices {
    audio: bool,
    video: bool,
}

impl SimulatedDevices {
    /// Devices with explicit grants.
    pub fn new(audio: bool, video: bool) -> Self {
        Self { audio, video }
    }

    /// Microphone and camera both grantable.
    pub fn all() -> Self {
        Self::new(true, true)
    }

    /// Microphone only; camera acquisition fails.
    pub fn audio_only() -> Self {
        Self::new(true, false)
    }

    /// Nothing grantable.
    pub fn none() -> Self {
        Self::new(false, false)
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn capability(&self, mode: MediaMode) -> MediaCapability {
        if !self.audio {
            return MediaCapability::Unavailable {
                reason: "no microphone".to_string(),
            };
        }
        if mode.has_video() && !self.video {
            return MediaCapability::Unavailable {
                reason: "no camera".to_string(),
            };
        }
        MediaCapability::Available
    }

    async fn capture(&self, mode: MediaMode) -> Result<MediaStream> {
        match self.capability(mode).await {
            MediaCapability::Available => Ok(MediaStream::for_mode(mode)),
            MediaCapability::Unavailable { reason } => Err(Error::Media(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_for_mode() {
        let devices = SimulatedDevices::all();

        let audio = devices.capture(MediaMode::Audio).await.unwrap();
        assert!(!audio.has_video());
        assert_eq!(audio.tracks().len(), 1);

        let video = devices.capture(MediaMode::Video).await.unwrap();
        assert!(video.has_video());
        assert_eq!(video.tracks().len(), 2);
    }

    #[tokio::test]
    async fn test_camera_denied() {
        let devices = SimulatedDevices::audio_only();

        assert!(!devices.capability(MediaMode::Video).await.is_available());
        assert!(devices.capture(MediaMode::Video).await.is_err());
        assert!(devices.capture(MediaMode::Audio).await.is_ok());
    }

    #[test]
    fn test_mute_keeps_device() {
        let mut stream = MediaStream::for_mode(MediaMode::Audio);
        stream.set_audio_enabled(false);

        assert!(!stream.tracks()[0].is_enabled());
        assert!(stream.is_live());

        stream.stop_all();
        assert!(!stream.is_live());
    }
}

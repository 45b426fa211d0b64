//! Call sessions, media capture, and peer connection seams.

pub mod loopback;
pub mod media;
pub mod peer;
pub mod session;

pub use loopback::LoopbackConnector;
pub use media::{MediaDevices, MediaMode, MediaStream, SimulatedDevices};
pub use peer::{IceCandidate, PeerConnection, PeerConnector, PeerEvent, SessionDescription};
pub use session::{CallSession, CallState, PendingIncomingCall};

//! Signal encoding and conversation log observation.

pub mod codec;
pub mod poller;

pub use codec::{decode, encode, SignalPayload, SIGNAL_PREFIX};
pub use poller::{ConversationPoller, LogCursor, LogEvent, PollerConfig};

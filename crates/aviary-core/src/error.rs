//! Error types for the aviary call-signaling core.
//!
//! Failures inside the call session machine never escape to the UI as
//! panics; they resolve to a status flag or a soft-fallback transition.
//! Decode failures on the shared message stream are not errors at all:
//! ordinary chat text travels next to signals, so the codec filters with
//! `Option` instead.

use thiserror::Error;

/// Core error type for signaling and session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Media device acquisition or track manipulation failed.
    #[error("media error: {0}")]
    Media(String),

    /// Message log read or append failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Peer connection operation failed.
    #[error("peer connection error: {0}")]
    Peer(String),

    /// Encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// No pending or active call to act on.
    #[error("no active call")]
    NoCall,

    /// Operation not valid in the current call state.
    #[error("invalid call state: {0}")]
    InvalidState(String),
}

/// Result type alias using the aviary core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}

//! # Aviary Core Library
//!
//! Serverless peer-to-peer call signaling over a shared, append-only
//! message log. Call offers, answers, connectivity candidates, and
//! rejections travel as hidden entries inside the ordinary chat stream;
//! each participant polls the log, de-duplicates what it has already
//! seen, and drives its own call session state machine from the result.
//!
//! ## Model
//!
//! - No signaling server: the chat log is the only rendezvous.
//! - Delivery is at-least-once; observers guarantee at-most-once
//!   processing per signal.
//! - Ordering is log append order; timestamps are display hints only.
//! - A session owns its media and its peer connection exclusively and
//!   releases both synchronously on teardown.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Application                 │
//! ├───────────────┬─────────────────────────┤
//! │     call      │         notify          │
//! ├───────────────┴─────────────────────────┤
//! │        signal (codec + poller)          │
//! ├─────────────────────────────────────────┤
//! │       storage (shared message log)      │
//! └─────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod call;
pub mod error;
pub mod identity;
pub mod logging;
pub mod notify;
pub mod signal;
pub mod storage;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default log polling cadence, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

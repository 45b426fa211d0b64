//! CLI command implementations.

use anyhow::{Context, Result};
use aviary_core::call::{CallSession, CallState, LoopbackConnector, MediaMode, SimulatedDevices};
use aviary_core::identity::PeerId;
use aviary_core::notify::{GlobalNotifier, Notice, NoticeWatermarks, NotifierConfig};
use aviary_core::signal::{ConversationPoller, LogEvent, PollerConfig};
use aviary_core::storage::{Database, DatabaseConfig, MemoryStore, MessageStore, DEFAULT_DB_NAME};
use chrono::{Local, TimeZone};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Open the local message log database.
fn open_store(data_dir: &str) -> Result<Database> {
    let config = DatabaseConfig {
        path: format!("{}/{}", data_dir, DEFAULT_DB_NAME),
        in_memory: false,
    };
    Database::open(&config).context("Failed to open message log")
}

/// Send a chat message.
pub fn send(data_dir: &str, identity: &str, peer: &str, message: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    let me = PeerId::new(identity);
    let peer = PeerId::new(peer);

    let appended = store
        .append_message(&me, &peer, message)
        .context("Failed to append message")?;

    println!("Sent to {} (id {})", peer, appended.id);
    Ok(())
}

/// Print the visible transcript with a peer.
pub fn history(data_dir: &str, identity: &str, peer: &str, limit: usize) -> Result<()> {
    let store = open_store(data_dir)?;
    let me = PeerId::new(identity);
    let peer = PeerId::new(peer);

    let messages = store
        .read_conversation(&me, &peer)
        .context("Failed to read conversation")?;

    let visible: Vec<_> = messages.iter().filter(|m| m.is_visible()).collect();
    if visible.is_empty() {
        println!("No messages with {}", peer);
        return Ok(());
    }

    for message in visible.iter().rev().take(limit).rev() {
        let when = Local
            .timestamp_millis_opt(message.timestamp)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| message.timestamp.to_string());
        println!("[{}] {}: {}", when, message.sender, message.text);
    }
    Ok(())
}

/// One end of an in-process conversation: a session plus the poller
/// observing the shared log for it.
struct Endpoint {
    session: CallSession,
    poller: ConversationPoller,
    events: mpsc::Receiver<LogEvent>,
}

impl Endpoint {
    fn new(me: &PeerId, peer: &PeerId, store: Arc<MemoryStore>) -> Self {
        let session = CallSession::new(
            me.clone(),
            peer.clone(),
            store.clone(),
            Arc::new(SimulatedDevices::all()),
            Arc::new(LoopbackConnector::new()),
        );
        let (poller, events) = ConversationPoller::new(
            store,
            me.clone(),
            peer.clone(),
            PollerConfig::default(),
        );
        Self {
            session,
            poller,
            events,
        }
    }

    async fn tick(&mut self) -> Result<()> {
        self.poller.poll_once().await?;
        while let Ok(event) = self.events.try_recv() {
            if let LogEvent::Signal { from, payload, .. } = event {
                self.session.handle_signal(&from, payload).await?;
            }
        }
        self.session.pump_events();
        Ok(())
    }
}

fn report(label: &str, state: CallState, error: Option<&str>) {
    match error {
        Some(status) => println!("{label}: {state:?} ({status})"),
        None => println!("{label}: {state:?}"),
    }
}

/// Run a complete call flow with both ends in-process, over a shared
/// in-memory log, so every signal travels the real polled path.
pub async fn call(identity: &str, peer: &str, mode: MediaMode, decline: bool) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let me = PeerId::new(identity);
    let them = PeerId::new(peer);

    let mut caller = Endpoint::new(&me, &them, store.clone());
    let mut callee = Endpoint::new(&them, &me, store.clone());

    // The far side's global scan, as it would run with no view open.
    let mut notifier = GlobalNotifier::with_watermarks(
        store,
        them.clone(),
        vec![me.clone()],
        NotifierConfig::default(),
        NoticeWatermarks::default(),
    );

    println!("Calling {them} ({mode})...");
    caller.session.start_call(mode).await?;
    report("caller", caller.session.state(), caller.session.call_error());

    for notice in notifier.scan_once()? {
        if let Notice::IncomingCall(pending) = notice {
            println!("callee: incoming {} call from {}", pending.media, pending.from);
        }
    }

    // Far side's poll pass observes the offer.
    callee.tick().await?;
    report("callee", callee.session.state(), callee.session.call_error());

    if decline {
        callee.session.reject_incoming(&me)?;
        caller.tick().await?;
        report("caller", caller.session.state(), caller.session.call_error());
        return Ok(());
    }

    callee.session.accept_incoming(&me).await?;
    caller.tick().await?;
    report("callee", callee.session.state(), callee.session.call_error());
    report("caller", caller.session.state(), caller.session.call_error());

    // Let relayed candidates cross over.
    callee.tick().await?;
    caller.tick().await?;

    caller.session.end_call();
    report("caller", caller.session.state(), caller.session.call_error());
    Ok(())
}

/// Ring yourself: the echoed offer is the incoming ring, and accepting
/// it connects locally.
pub async fn self_call(identity: &str) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let me = PeerId::new(identity);

    let mut endpoint = Endpoint::new(&me, &me, store);

    println!("Calling yourself...");
    endpoint.session.start_call(MediaMode::Audio).await?;
    endpoint.tick().await?;

    if endpoint.session.pending_offer(&me).is_some() {
        println!("Ringing (echoed offer observed)");
    }
    endpoint.session.accept_incoming(&me).await?;
    report(
        "session",
        endpoint.session.state(),
        endpoint.session.call_error(),
    );

    endpoint.session.end_call();
    report(
        "session",
        endpoint.session.state(),
        endpoint.session.call_error(),
    );
    Ok(())
}

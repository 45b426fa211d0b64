//! Cross-conversation notices.
//!
//! A background scan over every contact's conversation surfaces two
//! kinds of notice regardless of which view is open: new inbound chat
//! text, and incoming call offers. Each category keeps its own
//! watermark (newest timestamp already surfaced), so a notice fires at
//! most once per log entry even though every scan re-reads full
//! snapshots. Timestamps order notices within one observer only; they
//! are never trusted across peers.

use crate::call::session::PendingIncomingCall;
use crate::error::Result;
use crate::identity::PeerId;
use crate::logging::RedactedPeer;
use crate::signal::codec::SignalPayload;
use crate::storage::MessageStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// How long a surfaced notice stays relevant for display.
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

/// Default scan interval.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(2);

/// A notice surfaced by the global scan.
#[derive(Debug, Clone)]
pub enum Notice {
    /// New inbound chat text in some conversation.
    Message {
        /// The sending peer.
        from: PeerId,
        /// The message text, for display.
        preview: String,
    },
    /// An incoming call offer, carrying everything needed to ring and
    /// answer it.
    IncomingCall(PendingIncomingCall),
}

/// Per-observer newest-surfaced timestamps, one per notice category.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoticeWatermarks {
    /// Newest inbound chat timestamp already surfaced.
    pub last_message_seen_at: i64,
    /// Newest incoming offer timestamp already surfaced.
    pub last_call_seen_at: i64,
}

impl NoticeWatermarks {
    /// Watermarks seeded to the present, so only entries appended after
    /// this instant produce notices.
    pub fn now() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            last_message_seen_at: now,
            last_call_seen_at: now,
        }
    }
}

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Scan interval.
    pub interval: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

/// Background scanner over every contact's conversation.
pub struct GlobalNotifier {
    store: Arc<dyn MessageStore>,
    me: PeerId,
    contacts: Vec<PeerId>,
    watermarks: NoticeWatermarks,
    notices: broadcast::Sender<Notice>,
    config: NotifierConfig,
}

impl GlobalNotifier {
    /// Create a notifier that surfaces only activity after this instant.
    pub fn new(
        store: Arc<dyn MessageStore>,
        me: PeerId,
        contacts: Vec<PeerId>,
        config: NotifierConfig,
    ) -> Self {
        Self::with_watermarks(store, me, contacts, config, NoticeWatermarks::now())
    }

    /// Create a notifier with explicit starting watermarks.
    pub fn with_watermarks(
        store: Arc<dyn MessageStore>,
        me: PeerId,
        contacts: Vec<PeerId>,
        config: NotifierConfig,
        watermarks: NoticeWatermarks,
    ) -> Self {
        let (notices, _) = broadcast::channel(32);
        Self {
            store,
            me,
            contacts,
            watermarks,
            notices,
            config,
        }
    }

    /// Subscribe to surfaced notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Current watermarks.
    pub fn watermarks(&self) -> NoticeWatermarks {
        self.watermarks
    }

    /// Run one scan pass over every contact.
    ///
    /// Watermarks advance only after the whole pass, so several
    /// conversations can each surface a notice in the same pass without
    /// shadowing one another.
    pub fn scan_once(&mut self) -> Result<Vec<Notice>> {
        let mut newest_message = self.watermarks.last_message_seen_at;
        let mut newest_call = self.watermarks.last_call_seen_at;
        let mut surfaced = Vec::new();

        for contact in &self.contacts {
            let snapshot = self.store.read_conversation(&self.me, contact)?;

            if let Some(message) = snapshot
                .iter()
                .rev()
                .find(|m| m.is_visible() && m.sender != self.me)
            {
                if message.timestamp > self.watermarks.last_message_seen_at {
                    newest_message = newest_message.max(message.timestamp);
                    surfaced.push(Notice::Message {
                        from: message.sender.clone(),
                        preview: message.text.clone(),
                    });
                }
            }

            if let Some((message, sdp, media)) = snapshot
                .iter()
                .rev()
                .filter(|m| m.sender != self.me)
                .find_map(|m| match m.signal() {
                    Some(SignalPayload::Offer { sdp, media }) => Some((m, sdp, media)),
                    _ => None,
                })
            {
                if message.timestamp > self.watermarks.last_call_seen_at {
                    info!(from = %RedactedPeer(&message.sender), "incoming call noticed");
                    newest_call = newest_call.max(message.timestamp);
                    surfaced.push(Notice::IncomingCall(PendingIncomingCall {
                        from: message.sender.clone(),
                        media,
                        sdp,
                    }));
                }
            }
        }

        self.watermarks.last_message_seen_at = newest_message;
        self.watermarks.last_call_seen_at = newest_call;

        for notice in &surfaced {
            // No subscribers is fine; the scan still advances watermarks.
            let _ = self.notices.send(notice.clone());
        }
        Ok(surfaced)
    }

    /// Decline a call offer surfaced by the scan, without opening the
    /// conversation.
    pub fn reject_call(&self, pending: &PendingIncomingCall) -> Result<()> {
        self.store
            .append_signal(&self.me, &pending.from, &SignalPayload::Reject)?;
        debug!(from = %RedactedPeer(&pending.from), "declined from notice");
        Ok(())
    }

    /// Run the scan loop forever. Stop by aborting the task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.scan_once() {
                warn!(error = %e, "global notice scan failed");
            }
        }
    }
}

/// One-shot handoff of a ringing call from the global scan to the
/// conversation view being opened for it.
#[derive(Debug, Default)]
pub struct CallHandoff {
    slot: Option<PendingIncomingCall>,
}

impl CallHandoff {
    /// Create an empty handoff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a ringing call for the next view to adopt. A newer offer
    /// replaces a staged one.
    pub fn offer(&mut self, pending: PendingIncomingCall) {
        self.slot = Some(pending);
    }

    /// Consume the staged call, if any. Exactly-once: a second take
    /// returns `None`.
    pub fn take(&mut self) -> Option<PendingIncomingCall> {
        self.slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::media::MediaMode;
    use crate::call::peer::SessionDescription;
    use crate::storage::MemoryStore;

    fn notifier_for(
        store: Arc<MemoryStore>,
        me: &str,
        contacts: &[&str],
    ) -> GlobalNotifier {
        GlobalNotifier::with_watermarks(
            store,
            PeerId::new(me),
            contacts.iter().map(|c| PeerId::new(*c)).collect(),
            NotifierConfig::default(),
            NoticeWatermarks::default(),
        )
    }

    #[test]
    fn test_message_notice_fires_once() {
        let store = Arc::new(MemoryStore::new());
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");
        store.append_message(&bob, &alice, "hello").expect("append");

        let mut notifier = notifier_for(store, "alice@example.com", &["bob@example.com"]);

        let first = notifier.scan_once().expect("scan");
        assert_eq!(first.len(), 1);
        match &first[0] {
            Notice::Message { from, preview } => {
                assert_eq!(from, &bob);
                assert_eq!(preview, "hello");
            }
            other => panic!("unexpected notice: {other:?}"),
        }

        // Unchanged log: nothing fires again.
        assert!(notifier.scan_once().expect("scan").is_empty());
    }

    #[test]
    fn test_own_messages_do_not_notify() {
        let store = Arc::new(MemoryStore::new());
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");
        store.append_message(&alice, &bob, "sent by me").expect("append");

        let mut notifier = notifier_for(store, "alice@example.com", &["bob@example.com"]);
        assert!(notifier.scan_once().expect("scan").is_empty());
    }

    #[test]
    fn test_call_notice_carries_the_offer() {
        let store = Arc::new(MemoryStore::new());
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");
        store
            .append_signal(
                &bob,
                &alice,
                &SignalPayload::Offer {
                    sdp: SessionDescription::offer("v=0 bob"),
                    media: MediaMode::Video,
                },
            )
            .expect("append");

        let mut notifier = notifier_for(store, "alice@example.com", &["bob@example.com"]);

        let notices = notifier.scan_once().expect("scan");
        assert_eq!(notices.len(), 1);
        match &notices[0] {
            Notice::IncomingCall(pending) => {
                assert_eq!(pending.from, bob);
                assert_eq!(pending.media, MediaMode::Video);
                assert_eq!(pending.sdp.sdp, "v=0 bob");
            }
            other => panic!("unexpected notice: {other:?}"),
        }
        assert!(notifier.scan_once().expect("scan").is_empty());
    }

    #[test]
    fn test_categories_watermark_independently() {
        let store = Arc::new(MemoryStore::new());
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");

        store.append_message(&bob, &alice, "text first").expect("append");
        let mut notifier =
            notifier_for(store.clone(), "alice@example.com", &["bob@example.com"]);
        assert_eq!(notifier.scan_once().expect("scan").len(), 1);

        // A call offer appended later still fires even though the chat
        // watermark already advanced past older entries.
        store
            .append_signal(
                &bob,
                &alice,
                &SignalPayload::Offer {
                    sdp: SessionDescription::offer("v=0 bob"),
                    media: MediaMode::Audio,
                },
            )
            .expect("append");

        let notices = notifier.scan_once().expect("scan");
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], Notice::IncomingCall(_)));
    }

    #[test]
    fn test_scan_covers_multiple_contacts() {
        let store = Arc::new(MemoryStore::new());
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");
        let carol = PeerId::new("carol@example.com");
        store.append_message(&bob, &alice, "from bob").expect("append");
        store.append_message(&carol, &alice, "from carol").expect("append");

        let mut notifier = notifier_for(
            store,
            "alice@example.com",
            &["bob@example.com", "carol@example.com"],
        );

        // Both conversations surface in a single pass.
        assert_eq!(notifier.scan_once().expect("scan").len(), 2);
        assert!(notifier.scan_once().expect("scan").is_empty());
    }

    #[test]
    fn test_reject_from_notice_appends_signal() {
        let store = Arc::new(MemoryStore::new());
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");
        store
            .append_signal(
                &bob,
                &alice,
                &SignalPayload::Offer {
                    sdp: SessionDescription::offer("v=0 bob"),
                    media: MediaMode::Audio,
                },
            )
            .expect("append");

        let mut notifier =
            notifier_for(store.clone(), "alice@example.com", &["bob@example.com"]);
        let notices = notifier.scan_once().expect("scan");
        let Notice::IncomingCall(pending) = &notices[0] else {
            panic!("expected call notice");
        };
        notifier.reject_call(pending).expect("reject");

        let last = store
            .read_conversation(&alice, &bob)
            .expect("read")
            .last()
            .and_then(|m| m.signal());
        assert_eq!(last, Some(SignalPayload::Reject));
    }

    #[test]
    fn test_handoff_consumed_exactly_once() {
        let mut handoff = CallHandoff::new();
        assert!(handoff.take().is_none());

        handoff.offer(PendingIncomingCall {
            from: PeerId::new("bob@example.com"),
            media: MediaMode::Audio,
            sdp: SessionDescription::offer("v=0 bob"),
        });

        assert!(handoff.take().is_some());
        assert!(handoff.take().is_none());
    }
}

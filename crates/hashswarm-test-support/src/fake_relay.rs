//! An in-memory stand-in for the signaling relay bus. `sign_event` mints a
//! deterministic fake id; `publish` records the event for later inspection
//! instead of sending it anywhere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hashswarm_protocol::signaling::RelayEvent;
use hashswarm_signaling::{EventFilter, RelayBus, SignalingError, UnsignedEvent};
use tokio::sync::mpsc;

/// The timestamp `sign_event` stamps onto an event when the caller's
/// `UnsignedEvent` didn't carry one relevant to the test at hand.
const DEFAULT_NOW_SEC: i64 = 1_000;

pub struct FakeRelayBus {
    pubkey: String,
    published: Mutex<Vec<RelayEvent>>,
    next_id: AtomicU64,
}

impl FakeRelayBus {
    pub fn new() -> Self {
        Self::with_pubkey("test-relay-pubkey")
    }

    pub fn with_pubkey(pubkey: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            published: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Drain and return every event published so far.
    pub fn take_published(&self) -> Vec<RelayEvent> {
        std::mem::take(&mut self.published.lock().unwrap())
    }
}

impl Default for FakeRelayBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayBus for FakeRelayBus {
    async fn subscribe(&self, _filter: EventFilter) -> Result<mpsc::Receiver<RelayEvent>, SignalingError> {
        let (_tx, rx) = mpsc::channel(16);
        Ok(rx)
    }

    async fn publish(&self, event: RelayEvent) -> Result<(), SignalingError> {
        self.published.lock().unwrap().push(event);
        Ok(())
    }

    async fn sign_event(&self, template: UnsignedEvent) -> Result<RelayEvent, SignalingError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let created_at = if template.created_at == 0 {
            DEFAULT_NOW_SEC
        } else {
            template.created_at
        };
        Ok(RelayEvent {
            id: format!("fake-evt-{id}"),
            pubkey: self.pubkey.clone(),
            created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
        })
    }
}

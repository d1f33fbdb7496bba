//! Filter construction and encode/decode for the pub/sub signaling codec
//! (spec §4.5). The relay transport and the gift-wrap crypto are consumed
//! interfaces (`RelayBus`, `GiftWrap`); this crate only shapes the bytes.

pub mod codec;
pub mod seen;

use async_trait::async_trait;
use hashswarm_protocol::signaling::RelayEvent;

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("relay bus: {0}")]
    Bus(String),
    #[error("gift wrap: {0}")]
    GiftWrap(String),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A not-yet-signed relay event template, produced by the codec and signed
/// by the bus before publishing.
#[derive(Debug, Clone)]
pub struct UnsignedEvent {
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub created_at: i64,
}

/// Subset of a nostr-like filter the codec needs: event kind, optional
/// indexed-tag constraints, and a lower bound on `created_at`.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub kinds: Vec<u32>,
    pub l_tag: Option<Vec<String>>,
    pub p_tag: Option<Vec<String>>,
    pub since: i64,
}

/// The pub/sub relay transport, consumed by the codec. Out of scope per the
/// core's purpose statement; production wiring talks to a real relay
/// connection, tests use `hashswarm_test_support::FakeRelayBus`.
#[async_trait]
pub trait RelayBus: Send + Sync {
    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> Result<tokio::sync::mpsc::Receiver<RelayEvent>, SignalingError>;
    async fn publish(&self, event: RelayEvent) -> Result<(), SignalingError>;
    async fn sign_event(&self, template: UnsignedEvent) -> Result<RelayEvent, SignalingError>;
}

/// The gift-wrap crypto primitive, consumed by the codec. Out of scope per
/// the core's purpose statement.
#[async_trait]
pub trait GiftWrap: Send + Sync {
    async fn wrap(&self, inner_content: String, recipient_pubkey: &str) -> Result<RelayEvent, SignalingError>;
    async fn unwrap(&self, event: &RelayEvent) -> Result<Option<String>, SignalingError>;
}

//! An in-memory stand-in for the gift-wrap crypto primitive. Real gift-wrap
//! encrypts `inner_content` to `recipient_pubkey`'s key and signs an outer
//! event; the fake just carries the plaintext through so codec tests can
//! exercise filtering and normalization without a real crypto dependency.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hashswarm_protocol::signaling::{RelayEvent, SIGNALING_KIND};
use hashswarm_signaling::{GiftWrap, SignalingError};

/// The timestamp stamped on a wrapped event; most codec tests decode with
/// either this exact value or with `event.created_at` itself, so its only
/// real requirement is to stay within the codec's max event age of itself.
const DEFAULT_NOW_SEC: i64 = 1_000;

pub struct FakeGiftWrap {
    sender_pubkey: String,
    next_id: AtomicU64,
}

impl FakeGiftWrap {
    pub fn new() -> Self {
        Self::with_sender("sender-pk")
    }

    pub fn with_sender(pubkey: impl Into<String>) -> Self {
        Self {
            sender_pubkey: pubkey.into(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl Default for FakeGiftWrap {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GiftWrap for FakeGiftWrap {
    async fn wrap(&self, inner_content: String, recipient_pubkey: &str) -> Result<RelayEvent, SignalingError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(RelayEvent {
            id: format!("fake-gift-{id}"),
            pubkey: self.sender_pubkey.clone(),
            created_at: DEFAULT_NOW_SEC,
            kind: SIGNALING_KIND,
            tags: vec![vec!["p".to_owned(), recipient_pubkey.to_owned()]],
            content: inner_content,
        })
    }

    async fn unwrap(&self, event: &RelayEvent) -> Result<Option<String>, SignalingError> {
        Ok(Some(event.content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrap_then_unwrap_round_trips_content() {
        let gift_wrap = FakeGiftWrap::new();
        let event = gift_wrap.wrap("payload".to_owned(), "pk-recipient").await.unwrap();
        assert_eq!(gift_wrap.unwrap(&event).await.unwrap(), Some("payload".to_owned()));
    }
}

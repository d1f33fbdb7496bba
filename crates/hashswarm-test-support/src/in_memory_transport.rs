//! A duplex in-memory `PeerTransport` pair for exercising `WebRtcController`
//! end to end without real WebRTC data channels. `pair()` hands back two
//! endpoints; whatever one side `send`s, the other observes via `recv`.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use hashswarm_peer::{PeerTransport, TransportError};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

pub struct InMemoryTransport {
    outbound: mpsc::Sender<(String, Vec<u8>)>,
    inbound: AsyncMutex<mpsc::Receiver<(String, Vec<u8>)>>,
    closed: Mutex<HashSet<String>>,
}

impl InMemoryTransport {
    /// Build a connected pair: `a.send(..)` is observed by `b.recv()` and
    /// vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a_to_b, rx_a_to_b) = mpsc::channel(64);
        let (tx_b_to_a, rx_b_to_a) = mpsc::channel(64);
        let a = Self {
            outbound: tx_a_to_b,
            inbound: AsyncMutex::new(rx_b_to_a),
            closed: Mutex::new(HashSet::new()),
        };
        let b = Self {
            outbound: tx_b_to_a,
            inbound: AsyncMutex::new(rx_a_to_b),
            closed: Mutex::new(HashSet::new()),
        };
        (a, b)
    }

    /// Wait for the next `(peer_id, bytes)` sent by the partner endpoint.
    pub async fn recv(&self) -> Option<(String, Vec<u8>)> {
        self.inbound.lock().await.recv().await
    }

    pub fn is_closed(&self, peer_id: &str) -> bool {
        self.closed.lock().unwrap().contains(peer_id)
    }
}

#[async_trait]
impl PeerTransport for InMemoryTransport {
    async fn send(&self, peer_id: &str, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send((peer_id.to_owned(), bytes))
            .await
            .map_err(|_| TransportError::Unavailable("partner endpoint dropped".to_owned()))
    }

    async fn close(&self, peer_id: &str) {
        self.closed.lock().unwrap().insert(peer_id.to_owned());
    }
}

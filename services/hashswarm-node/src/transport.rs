//! Placeholder `PeerTransport` for standalone runs of this binary.
//!
//! The actual WebRTC data channel and ICE/NAT-traversal machinery are
//! explicitly out of scope (spec §1 Non-goals, §6): a host application
//! embeds the `hashswarm` facade and supplies a real `PeerTransport` bridging
//! to its own WebRTC stack. Running `hashswarm-node` on its own has no such
//! host, so every send fails closed rather than silently pretending to
//! deliver bytes nobody receives.

use async_trait::async_trait;
use hashswarm_peer::{PeerTransport, TransportError};

pub struct UnconnectedPeerTransport;

#[async_trait]
impl PeerTransport for UnconnectedPeerTransport {
    async fn send(&self, peer_id: &str, _bytes: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(format!(
            "no data-channel bridge wired in for peer {peer_id}"
        )))
    }

    async fn close(&self, _peer_id: &str) {}
}

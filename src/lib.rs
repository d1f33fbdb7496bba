//! `hashswarm`: thin embedding facade over the core crates, re-exporting the
//! client API (spec §6) for a host application that is not the
//! `hashswarm-node` binary — e.g. a desktop shell or another server process
//! that wants the block-exchange runtime in-process rather than over a
//! socket. `hashswarm-node` itself is built the same way, on top of the same
//! `WebRtcController`; this crate just saves a second copy of the wiring.

use std::collections::HashMap;
use std::time::Duration;

use hashswarm_forwarding::{Clock, Timer};
use hashswarm_peer::{PeerError, WebRtcController};
use hashswarm_store::{PersistenceDriver, StoreError};
use tokio::sync::broadcast;

pub use hashswarm_bandwidth::{BandwidthTracker, Direction, EndpointBandwidth};
pub use hashswarm_forwarding::{
    Clock as NodeClock, ForwardingConfig, QueryForwardingMachine, SystemClock, Timer as NodeTimer,
    TokioTimer,
};
pub use hashswarm_peer::{
    BufferWatermark, ContentServerClient, PeerDirection, PeerError as NodePeerError, PeerPool,
    PeerTransport, ReqwestContentServerClient, TransportError,
};
pub use hashswarm_protocol::{BlobSource, Cid, Hash, PeerStats, StorageStats, SymKey};
pub use hashswarm_signaling::{GiftWrap, RelayBus, SignalingError};
pub use hashswarm_store::{
    BlobStore, MemoryPersistenceDriver, PersistenceDriver as NodePersistenceDriver,
    SqlitePersistenceDriver,
};

/// Result of `probeConnectivity` (spec §6): a coarse signal derived from
/// live peer and content-server reachability, not a guarantee of any
/// particular transport health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Degraded,
    Offline,
}

/// Event feed payloads (spec §6 `onConnectivityUpdate` / `onUploadProgress` /
/// `onBandwidth`). Delivered over a `tokio::sync::broadcast` channel; a
/// lagging subscriber misses old events rather than blocking the node.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    ConnectivityUpdate(ConnectivityState),
    UploadProgress { hash: Hash, bytes_sent: u64, total: u64 },
    Bandwidth { endpoint: String, sent: u64, received: u64 },
}

struct PendingStream {
    cid: Cid,
    buffer: Vec<u8>,
}

/// The embeddable node. Wraps a `WebRtcController` with the client-facing
/// vocabulary of spec §6: renamed convenience methods, streaming-upload
/// bookkeeping the core itself has no notion of, and an event feed.
pub struct Node<C: Clock, T: Timer, D: PersistenceDriver> {
    controller: WebRtcController<C, T, D>,
    events: broadcast::Sender<NodeEvent>,
    streams: HashMap<String, PendingStream>,
    next_stream_id: u64,
}

impl<C: Clock, T: Timer, D: PersistenceDriver> Node<C, T, D> {
    pub fn new(controller: WebRtcController<C, T, D>) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            controller,
            events,
            streams: HashMap::new(),
            next_stream_id: 0,
        }
    }

    /// Direct access to the wrapped controller, for callers that need
    /// peer-lifecycle or frame-handling operations this facade doesn't
    /// re-expose (e.g. `add_peer`, `handle_request`).
    pub fn controller(&self) -> &WebRtcController<C, T, D> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut WebRtcController<C, T, D> {
        &mut self.controller
    }

    pub fn events(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub async fn put_blob(
        &mut self,
        data: &[u8],
        cid: &Cid,
        upload: bool,
        auth_token: &str,
    ) -> Result<Hash, PeerError> {
        let hash = self.controller.put_blob(data, cid, upload, auth_token).await?;
        if upload {
            let _ = self.events.send(NodeEvent::UploadProgress {
                hash,
                bytes_sent: data.len() as u64,
                total: data.len() as u64,
            });
        }
        self.publish_bandwidth();
        Ok(hash)
    }

    pub async fn get_blob(
        &mut self,
        hash: Hash,
        htl: u8,
        request_timeout: Duration,
    ) -> Result<(Vec<u8>, BlobSource), PeerError> {
        let result = self.controller.get_blob(hash, htl, request_timeout).await;
        self.publish_bandwidth();
        result
    }

    pub fn set_content_servers(&mut self, servers: Vec<String>) {
        self.controller.set_content_servers(servers);
    }

    pub fn set_storage_max_bytes(&mut self, max_bytes: u64) {
        self.controller.set_storage_max_bytes(max_bytes);
    }

    pub fn get_storage_stats(&self) -> Result<StorageStats, StoreError> {
        self.controller.stats()
    }

    pub fn peer_stats(&self) -> HashMap<String, PeerStats> {
        self.controller.peer_stats()
    }

    /// Coarse connectivity signal: offline with neither peers nor content
    /// servers reachable, degraded with only one of the two, online
    /// otherwise. Also publishes the result on the event feed.
    pub fn probe_connectivity(&mut self) -> ConnectivityState {
        let connected_peers = self.controller.peer_stats().len();
        let content_servers = self.controller.content_servers().len();
        let state = match (connected_peers, content_servers) {
            (0, 0) => ConnectivityState::Offline,
            (0, _) | (_, 0) => ConnectivityState::Degraded,
            _ => ConnectivityState::Online,
        };
        let _ = self.events.send(NodeEvent::ConnectivityUpdate(state));
        state
    }

    fn publish_bandwidth(&self) {
        for (endpoint, counters) in self.controller.bandwidth().endpoints() {
            let _ = self.events.send(NodeEvent::Bandwidth {
                endpoint: endpoint.to_owned(),
                sent: counters.bytes_sent,
                received: counters.bytes_received,
            });
        }
    }

    // -- streaming putBlob (spec §6) ----------------------------------------
    //
    // The core has no notion of a multi-chunk upload; these methods buffer
    // chunks here and call through to `put_blob` once the stream finishes.

    pub fn begin_put_blob_stream(&mut self, cid: Cid) -> String {
        let id = format!("stream-{}", self.next_stream_id);
        self.next_stream_id += 1;
        self.streams.insert(
            id.clone(),
            PendingStream {
                cid,
                buffer: Vec::new(),
            },
        );
        id
    }

    pub fn append_put_blob_stream(&mut self, stream_id: &str, chunk: &[u8]) -> Result<(), PeerError> {
        let stream = self
            .streams
            .get_mut(stream_id)
            .ok_or_else(|| PeerError::Protocol(format!("unknown upload stream {stream_id}")))?;
        stream.buffer.extend_from_slice(chunk);
        let _ = self.events.send(NodeEvent::UploadProgress {
            hash: stream.cid.hash,
            bytes_sent: stream.buffer.len() as u64,
            total: stream.buffer.len() as u64,
        });
        Ok(())
    }

    pub async fn finish_put_blob_stream(
        &mut self,
        stream_id: &str,
        upload: bool,
        auth_token: &str,
    ) -> Result<Hash, PeerError> {
        let stream = self
            .streams
            .remove(stream_id)
            .ok_or_else(|| PeerError::Protocol(format!("unknown upload stream {stream_id}")))?;
        self.put_blob(&stream.buffer, &stream.cid, upload, auth_token).await
    }

    pub fn cancel_put_blob_stream(&mut self, stream_id: &str) {
        self.streams.remove(stream_id);
    }
}

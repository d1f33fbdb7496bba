//! `WebRtcController` (spec §4.4): owns peer records, drives the forwarding
//! machine, the blob store, the privacy guard, and per-peer bandwidth
//! accounting. This is the single owner task described in spec §5 — every
//! mutation happens through `&mut self` methods, never a process-wide
//! singleton (Design Note §9).

use crate::peer::{PeerDirection, PeerPool, PeerRecord, PeerState};
use crate::reassembly::ReassemblyBuffer;
use crate::transport::{BufferWatermark, ContentServerClient, PeerTransport, TransportError};
use hashswarm_bandwidth::BandwidthTracker;
use hashswarm_forwarding::{Clock, ForwardDecision, QueryForwardingMachine, Timer};
use hashswarm_protocol::frame::{RequestFrame, ResponseFragment};
use hashswarm_protocol::{BlobSource, Cid, Hash};
use hashswarm_store::{BlobStore, PersistenceDriver, PrivacyGuard, StoreError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

const MAX_FRAGMENT_PAYLOAD: usize = 16 * 1024;
const LOCAL_WAITER_PREFIX: &str = "local:";

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("request timed out")]
    Timeout,
    #[error("malformed frame: {0}")]
    Protocol(String),
}

pub fn is_local_waiter(requester_id: &str) -> bool {
    requester_id.starts_with(LOCAL_WAITER_PREFIX)
}

pub fn new_local_waiter_id() -> String {
    format!("{LOCAL_WAITER_PREFIX}{}", uuid_like())
}

/// A small non-cryptographic unique suffix; good enough to key a local
/// in-process waiter, not used anywhere security-sensitive.
fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{n:x}")
}

struct PendingLocalGet {
    reply: oneshot::Sender<Option<Vec<u8>>>,
}

pub struct WebRtcController<C: Clock, T: Timer, D: PersistenceDriver> {
    peers: HashMap<String, PeerRecord>,
    transport: Arc<dyn PeerTransport>,
    content_servers: Vec<String>,
    content_client: Arc<dyn ContentServerClient>,
    forwarding: QueryForwardingMachine<C, T>,
    store: BlobStore<D>,
    privacy: PrivacyGuard,
    bandwidth: BandwidthTracker,
    reassembly: ReassemblyBuffer,
    pending_local_gets: HashMap<String, PendingLocalGet>,
    follows_cursor: usize,
    other_cursor: usize,
    paused_peers: HashSet<String>,
    pending_response_fragments: HashMap<String, VecDeque<ResponseFragment>>,
}

impl<C: Clock, T: Timer, D: PersistenceDriver> WebRtcController<C, T, D> {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        content_client: Arc<dyn ContentServerClient>,
        forwarding: QueryForwardingMachine<C, T>,
        store: BlobStore<D>,
        reassembly_window: Duration,
    ) -> Self {
        Self {
            peers: HashMap::new(),
            transport,
            content_servers: Vec::new(),
            content_client,
            forwarding,
            store,
            privacy: PrivacyGuard::new(),
            bandwidth: BandwidthTracker::new(),
            reassembly: ReassemblyBuffer::new(reassembly_window),
            pending_local_gets: HashMap::new(),
            follows_cursor: 0,
            other_cursor: 0,
            paused_peers: HashSet::new(),
            pending_response_fragments: HashMap::new(),
        }
    }

    pub fn set_content_servers(&mut self, servers: Vec<String>) {
        self.content_servers = servers;
    }

    /// Client API `setStorageMaxBytes` (spec §6). Takes effect on the next
    /// write's eviction pass rather than evicting immediately.
    pub fn set_storage_max_bytes(&mut self, max_bytes: u64) {
        self.store.set_max_bytes(max_bytes);
    }

    pub fn content_servers(&self) -> &[String] {
        &self.content_servers
    }

    pub fn privacy_guard_mut(&mut self) -> &mut PrivacyGuard {
        &mut self.privacy
    }

    pub fn bandwidth(&self) -> &BandwidthTracker {
        &self.bandwidth
    }

    pub fn stats(&self) -> Result<hashswarm_protocol::StorageStats, StoreError> {
        self.store.stats()
    }

    /// Per-peer counters for the status surface (spec §10.5).
    pub fn peer_stats(&self) -> HashMap<String, hashswarm_protocol::PeerStats> {
        self.peers.iter().map(|(id, record)| (id.clone(), record.stats)).collect()
    }

    pub fn in_flight_forwards(&self) -> usize {
        self.forwarding.in_flight_count()
    }

    /// Route a fired `Timer` token back into the forwarding machine. The
    /// driving loop calls this for every token it receives from its
    /// `Timer::schedule` callback channel (see `hashswarm_forwarding::TokioTimer`),
    /// then drains `drain_forward_timeouts` to fail any attached local waiters.
    pub fn on_timer_fired(&mut self, hash_key: &str) {
        self.forwarding.on_timer_fired(hash_key);
    }

    // -- peer lifecycle ---------------------------------------------------

    pub fn add_peer(&mut self, peer_id: String, remote_pubkey: String, pool: PeerPool, direction: PeerDirection) {
        self.peers
            .insert(peer_id.clone(), PeerRecord::new(peer_id, remote_pubkey, pool, direction));
    }

    pub fn mark_peer_connected(&mut self, peer_id: &str) {
        if let Some(record) = self.peers.get_mut(peer_id) {
            record.mark_connected();
        }
    }

    /// Peer transitions to disconnected: release in-flight forwards keyed
    /// on it, drain its reassembly buffers (spec §4.4).
    pub fn remove_peer(&mut self, peer_id: &str) {
        if let Some(record) = self.peers.get_mut(peer_id) {
            record.mark_disconnected();
        }
        self.peers.remove(peer_id);
        self.forwarding.remove_peer(peer_id);
        self.reassembly.drain_peer(peer_id);
        self.paused_peers.remove(peer_id);
        self.pending_response_fragments.remove(peer_id);
    }

    /// Route a buffer-watermark transition reported by the data-channel
    /// transport (spec §4.3). `bufferHigh` pauses outbound response
    /// fragments queued through `send_fragments`; pending ones are resumed
    /// in order on `bufferLow`. Requests are never paused — they go out
    /// through `transport.send` directly in `handle_request`/`get_blob`.
    pub async fn on_buffer_watermark(&mut self, peer_id: &str, watermark: BufferWatermark) {
        match watermark {
            BufferWatermark::High => {
                self.paused_peers.insert(peer_id.to_owned());
            }
            BufferWatermark::Low => {
                self.paused_peers.remove(peer_id);
                self.flush_pending_fragments(peer_id).await;
            }
        }
    }

    async fn flush_pending_fragments(&mut self, peer_id: &str) {
        let Some(mut queue) = self.pending_response_fragments.remove(peer_id) else {
            return;
        };
        while let Some(frag) = queue.pop_front() {
            if self.paused_peers.contains(peer_id) {
                queue.push_front(frag);
                break;
            }
            let encoded = frag.encode();
            let len = encoded.len() as u64;
            if self.transport.send(peer_id, encoded).await.is_ok() {
                self.bandwidth.record_sent(peer_id, len);
            }
        }
        if !queue.is_empty() {
            self.pending_response_fragments.insert(peer_id.to_owned(), queue);
        }
    }

    /// Expire reassembly buffers that have gapped past their window and
    /// cancel the matching forward — `resolveForward` is never called for a
    /// reassembly that fails this way (spec §4.3). The owning loop should
    /// call this on its own periodic tick, alongside `drain_forward_timeouts`.
    pub fn drain_reassembly_timeouts(&mut self, now: Instant) {
        for key in self.reassembly.expire(now) {
            let hash_key = key.hash.to_hex();
            for requester in self.forwarding.cancel_forward(&hash_key) {
                if is_local_waiter(&requester) {
                    if let Some(pending) = self.pending_local_gets.remove(&requester) {
                        let _ = pending.reply.send(None);
                    }
                }
            }
        }
    }

    /// The full candidate target set for forwarding (spec §4.3 step 2: "all
    /// currently connected peers"). Ordered `follows` pool first, since that
    /// is the preferred pool for forwarding candidate selection (spec §4.4);
    /// ties within a pool are broken by rotating cursors to avoid
    /// hot-spotting the same peer first on every call.
    fn connected_peer_ids(&mut self) -> Vec<String> {
        let mut follows: Vec<&String> = self
            .peers
            .values()
            .filter(|p| p.state == PeerState::Connected && p.pool == PeerPool::Follows)
            .map(|p| &p.peer_id)
            .collect();
        let mut other: Vec<&String> = self
            .peers
            .values()
            .filter(|p| p.state == PeerState::Connected && p.pool == PeerPool::Other)
            .map(|p| &p.peer_id)
            .collect();
        follows.sort();
        other.sort();
        if !follows.is_empty() {
            self.follows_cursor = (self.follows_cursor + 1) % follows.len();
            follows.rotate_left(self.follows_cursor);
        }
        if !other.is_empty() {
            self.other_cursor = (self.other_cursor + 1) % other.len();
            other.rotate_left(self.other_cursor);
        }
        follows.into_iter().chain(other).cloned().collect()
    }

    // -- request/response dispatch (spec §4.3) -----------------------------

    /// Handle a request frame arriving from `from_peer`.
    pub async fn handle_request(&mut self, from_peer: &str, request: RequestFrame) -> Result<(), PeerError> {
        let hash_key = request.hash.to_hex();

        if self.store.has(&request.hash)? && self.privacy.should_serve_hash_to_peer(&hash_key) {
            let data = self.store.get(&request.hash)?.expect("has() just confirmed presence");
            self.send_fragments(from_peer, request.hash, &data).await?;
            return Ok(());
        }

        if request.htl <= 1 {
            // local-only; drop.
            return Ok(());
        }

        let candidates = self.connected_peer_ids();
        match self.forwarding.begin_forward(&hash_key, from_peer, &candidates) {
            ForwardDecision::Forward(targets) => {
                let decremented = request.decremented();
                for target in targets {
                    let encoded = decremented.encode();
                    let len = encoded.len() as u64;
                    if self.transport.send(&target, encoded).await.is_ok() {
                        self.bump_stats(&target, |s| s.forwarded_requests += 1);
                        self.bandwidth.record_sent(&target, len);
                    }
                }
            }
            ForwardDecision::Suppressed => {
                self.bump_stats(from_peer, |s| s.forwarded_suppressed += 1);
            }
            ForwardDecision::RateLimited | ForwardDecision::NoTargets => {
                // dropped, per spec §4.3 step 2.
            }
        }
        Ok(())
    }

    /// Handle one response fragment arriving from `from_peer`.
    pub async fn handle_response_fragment(
        &mut self,
        from_peer: &str,
        fragment: ResponseFragment,
        now: Instant,
    ) -> Result<(), PeerError> {
        let wire_len = fragment.wire_len();
        self.bandwidth.record_received(from_peer, wire_len);

        let Some(payload) = self.reassembly.accept(
            from_peer,
            fragment.hash,
            fragment.seq,
            fragment.last,
            fragment.payload,
            now,
        ) else {
            return Ok(());
        };

        let computed = hashswarm_store::sha256_hash(&payload);
        if computed != fragment.hash {
            tracing::warn!(peer_id = from_peer, "response hash mismatch, discarding");
            // Store unchanged, forward entry left in place (spec §8 scenario 5).
            return Ok(());
        }

        self.store.put_by_hash_trusted(fragment.hash, &payload)?;

        let hash_key = fragment.hash.to_hex();
        let requesters = self.forwarding.resolve_forward(&hash_key);
        for requester in requesters {
            if is_local_waiter(&requester) {
                if let Some(pending) = self.pending_local_gets.remove(&requester) {
                    let _ = pending.reply.send(Some(payload.clone()));
                }
            } else {
                if self.send_fragments(&requester, fragment.hash, &payload).await.is_ok() {
                    self.bump_stats(&requester, |s| s.forwarded_resolved += 1);
                }
            }
        }
        Ok(())
    }

    /// Drain forwarding-machine timeouts and fail any local waiters whose
    /// forward expired without a resolve or cancel.
    pub fn drain_forward_timeouts(&mut self) {
        for timed_out in self.forwarding.drain_timeouts() {
            for requester in timed_out.requester_ids {
                if is_local_waiter(&requester) {
                    if let Some(pending) = self.pending_local_gets.remove(&requester) {
                        let _ = pending.reply.send(None);
                    }
                }
            }
        }
    }

    /// Split `data` into response fragments and send them to `peer_id`. If
    /// the peer is currently in `bufferHigh`, fragments are queued instead
    /// of sent and flushed once `bufferLow` arrives (spec §4.3) — only
    /// response fragments pause this way, never request frames.
    async fn send_fragments(&mut self, peer_id: &str, hash: Hash, data: &[u8]) -> Result<(), PeerError> {
        let fragments = if data.is_empty() {
            vec![ResponseFragment {
                hash,
                seq: 0,
                last: true,
                payload: Vec::new(),
            }]
        } else {
            let chunks: Vec<&[u8]> = data.chunks(MAX_FRAGMENT_PAYLOAD).collect();
            let last_idx = chunks.len() - 1;
            chunks
                .into_iter()
                .enumerate()
                .map(|(seq, chunk)| ResponseFragment {
                    hash,
                    seq: seq as u32,
                    last: seq == last_idx,
                    payload: chunk.to_vec(),
                })
                .collect()
        };

        for frag in fragments {
            if self.paused_peers.contains(peer_id) {
                self.pending_response_fragments
                    .entry(peer_id.to_owned())
                    .or_default()
                    .push_back(frag);
                continue;
            }
            let encoded = frag.encode();
            let len = encoded.len() as u64;
            self.transport.send(peer_id, encoded).await?;
            self.bandwidth.record_sent(peer_id, len);
        }
        Ok(())
    }

    fn bump_stats(&mut self, peer_id: &str, f: impl FnOnce(&mut hashswarm_protocol::PeerStats)) {
        if let Some(record) = self.peers.get_mut(peer_id) {
            f(&mut record.stats);
        }
    }

    // -- client API (spec §6) ----------------------------------------------

    /// `putBlob`: stores locally (encrypted-upload invariant enforced by the
    /// caller supplying an already-encrypted `Cid`), and if `upload`, pushes
    /// to every configured content server.
    pub async fn put_blob(&mut self, data: &[u8], cid: &Cid, upload: bool, auth_token: &str) -> Result<Hash, PeerError> {
        if upload {
            self.privacy.assert_encrypted_upload_cid(cid)?;
        }
        let hash = self.store.put(data)?;
        if upload {
            for server in self.content_servers.clone() {
                match self.content_client.upload(&server, auth_token, data.to_vec()).await {
                    Ok(()) => self.bandwidth.record_sent(&server, data.len() as u64),
                    Err(err) => tracing::warn!(%server, %err, "upload failed"),
                }
            }
        }
        Ok(hash)
    }

    /// `getBlob`: local store, then write-eligible HTTP servers, then a
    /// peer-forwarded gossip lookup (spec §2 data flow for a read).
    pub async fn get_blob(&mut self, hash: Hash, htl: u8, request_timeout: Duration) -> Result<(Vec<u8>, BlobSource), PeerError> {
        if let Some(data) = self.store.get(&hash)? {
            return Ok((data, BlobSource::Idb));
        }

        for server in self.content_servers.clone() {
            if let Ok(Some(data)) = self.content_client.fetch(&server, &hash).await {
                self.bandwidth.record_received(&server, data.len() as u64);
                self.store.put_by_hash(hash, &data)?;
                return Ok((data, BlobSource::Blossom));
            }
        }

        if htl <= 1 {
            return Err(PeerError::Timeout);
        }

        let requester_id = new_local_waiter_id();
        let candidates = self.connected_peer_ids();
        let hash_key = hash.to_hex();
        match self.forwarding.begin_forward(&hash_key, &requester_id, &candidates) {
            ForwardDecision::Forward(targets) => {
                let req = RequestFrame { hash, htl };
                for target in &targets {
                    let encoded = req.encode();
                    let len = encoded.len() as u64;
                    if self.transport.send(target, encoded).await.is_ok() {
                        self.bump_stats(target, |s| s.forwarded_requests += 1);
                        self.bandwidth.record_sent(target, len);
                    }
                }
            }
            _ => return Err(PeerError::Timeout),
        }

        let (tx, rx) = oneshot::channel();
        self.pending_local_gets
            .insert(requester_id.clone(), PendingLocalGet { reply: tx });

        match tokio::time::timeout(request_timeout, rx).await {
            Ok(Ok(Some(data))) => Ok((data, BlobSource::P2p)),
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => {
                self.pending_local_gets.remove(&requester_id);
                self.forwarding.cancel_forward(&hash_key);
                Err(PeerError::Timeout)
            }
        }
    }
}

//! End-to-end scenarios across the forwarding machine, the blob store, the
//! peer controller, and the signaling codec (spec §8). Each test drives two
//! or three `WebRtcController`s directly rather than standing up a real
//! transport: the controllers' `handle_request`/`handle_response_fragment`
//! calls are chained by hand in exactly the order a real transport would
//! have delivered the frames, which keeps the scenarios deterministic
//! without needing a network simulator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hashswarm_forwarding::{ForwardingConfig, QueryForwardingMachine};
use hashswarm_peer::{
    ContentServerClient, PeerDirection, PeerError, PeerPool, PeerTransport, ReqwestContentServerClient,
    TransportError, WebRtcController,
};
use hashswarm_protocol::frame::{RequestFrame, ResponseFragment};
use hashswarm_protocol::{Cid, Hash};
use hashswarm_store::{BlobStore, MemoryPersistenceDriver};
use hashswarm_test_support::VirtualClock;

/// A transport that always accepts sends without delivering them anywhere;
/// these tests move frames between controllers by calling straight into the
/// receiving controller's `handle_*` methods instead.
struct DiscardTransport;

#[async_trait]
impl PeerTransport for DiscardTransport {
    async fn send(&self, _peer_id: &str, _bytes: Vec<u8>) -> Result<(), TransportError> {
        Ok(())
    }
    async fn close(&self, _peer_id: &str) {}
}

/// A `ContentServerClient` that records whether `upload` was ever called, to
/// prove a rejected upload never reached the transport (scenario 4).
#[derive(Default)]
struct SpyContentServerClient {
    upload_calls: AtomicU32,
}

#[async_trait]
impl ContentServerClient for SpyContentServerClient {
    async fn probe(&self, _base_url: &str, _hash: &Hash) -> Result<bool, TransportError> {
        Ok(false)
    }
    async fn fetch(&self, _base_url: &str, _hash: &Hash) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(None)
    }
    async fn upload(&self, _base_url: &str, _auth_token: &str, _data: Vec<u8>) -> Result<(), TransportError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type TestController = WebRtcController<VirtualClock, VirtualClock, MemoryPersistenceDriver>;

fn test_controller() -> TestController {
    let clock = VirtualClock::new();
    let timer = clock.clone();
    let forwarding = QueryForwardingMachine::new(ForwardingConfig::default(), clock, timer);
    let store = BlobStore::new(MemoryPersistenceDriver::new(), 16 * 1024 * 1024);
    WebRtcController::new(
        Arc::new(DiscardTransport),
        Arc::new(ReqwestContentServerClient::new()),
        forwarding,
        store,
        Duration::from_secs(5),
    )
}

fn connect(ctrl: &mut TestController, peer_id: &str) {
    ctrl.add_peer(peer_id.to_owned(), format!("{peer_id}-pubkey"), PeerPool::Other, PeerDirection::Outbound);
    ctrl.mark_peer_connected(peer_id);
}

/// Scenario: three-node chain A—B—C. A (a bare requester id, standing in for
/// the true originator) asks B for a hash only C holds, with HTL 6.
#[tokio::test]
async fn three_node_chain_resolves_through_one_intermediate_hop() {
    let mut b = test_controller();
    let mut c = test_controller();
    connect(&mut b, "C");
    connect(&mut c, "B");

    let data = b"chain payload".to_vec();
    let hash = c.put_blob(&data, &Cid::bare(Hash::from_bytes(&[0u8; 32]).unwrap()), false, "").await.unwrap();
    c.privacy_guard_mut().mark_encrypted_hashes([hash.to_hex()]);

    b.handle_request("A", RequestFrame { hash, htl: 6 }).await.unwrap();
    assert_eq!(b.peer_stats()["C"].forwarded_requests, 1);

    c.handle_request("B", RequestFrame { hash, htl: 5 }).await.unwrap();
    assert_eq!(c.in_flight_forwards(), 0, "C served locally, never forwarded");

    let fragment = ResponseFragment { hash, seq: 0, last: true, payload: data.clone() };
    b.handle_response_fragment("C", fragment, Instant::now()).await.unwrap();

    assert_eq!(b.peer_stats()["A"].forwarded_resolved, 1);
    assert_eq!(b.in_flight_forwards(), 0);
}

/// Scenario: triangle A-B-C (all three pairwise connected), HTL 8, nobody
/// holds the content. A's broadcast to both B and C produces exactly two
/// suppressions (the second copy each of B and C sees of the same hash) and
/// every forward ultimately times out with no resolution.
#[tokio::test]
async fn triangle_topology_suppresses_twice_then_times_out() {
    let mut b = test_controller();
    let mut c = test_controller();
    connect(&mut b, "C");
    connect(&mut c, "B");

    let hash = Hash::from_bytes(&[5u8; 32]).unwrap();
    let from_a = RequestFrame { hash, htl: 8 };

    // A's broadcast reaches C first, then B.
    c.handle_request("A", from_a.clone()).await.unwrap();
    b.handle_request("A", from_a).await.unwrap();

    // C forwarded to B as part of handling A's request; that arrives at B
    // after B's own in-flight entry (from A) already exists -> suppressed.
    b.handle_request("C", RequestFrame { hash, htl: 7 }).await.unwrap();
    // Symmetrically, B's forward to C arrives after C's own entry exists.
    c.handle_request("B", RequestFrame { hash, htl: 7 }).await.unwrap();

    let suppressed = b.peer_stats()["C"].forwarded_suppressed + c.peer_stats()["B"].forwarded_suppressed;
    assert_eq!(suppressed, 2);

    let hash_key = hash.to_hex();
    b.on_timer_fired(&hash_key);
    b.drain_forward_timeouts();
    c.on_timer_fired(&hash_key);
    c.drain_forward_timeouts();

    assert_eq!(b.in_flight_forwards(), 0);
    assert_eq!(c.in_flight_forwards(), 0);
}

/// Scenario: a sliding-window rate limiter boundary exactly at 1001ms. One
/// forward per window is allowed; the second attempt inside the window is
/// rejected, and the window's expiry at +1001ms (>= the 1000ms window) frees
/// the quota again.
#[tokio::test]
async fn rate_limit_window_boundary_at_1001ms() {
    use hashswarm_forwarding::ForwardDecision;

    let clock = VirtualClock::new();
    let timer = clock.clone();
    let config = ForwardingConfig {
        max_forwards_per_peer_window: 1,
        forward_rate_limit_window: Duration::from_millis(1000),
        request_timeout: Duration::from_secs(10),
    };
    let mut machine = QueryForwardingMachine::new(config, clock.clone(), timer);
    let candidates = vec!["peer-b".to_owned()];

    let first = machine.begin_forward("hash-a", "requester", &candidates);
    assert_eq!(first, ForwardDecision::Forward(candidates.clone()));
    machine.resolve_forward("hash-a");

    clock.advance(Duration::from_millis(999));
    let second = machine.begin_forward("hash-b", "requester", &candidates);
    assert_eq!(second, ForwardDecision::RateLimited);

    clock.advance(Duration::from_millis(2));
    let third = machine.begin_forward("hash-c", "requester", &candidates);
    assert_eq!(third, ForwardDecision::Forward(candidates));
}

/// Scenario: an upload with an unencrypted CID is rejected before any HTTP
/// request is issued.
#[tokio::test]
async fn privacy_violation_upload_is_rejected_without_issuing_a_request() {
    let clock = VirtualClock::new();
    let timer = clock.clone();
    let forwarding = QueryForwardingMachine::new(ForwardingConfig::default(), clock, timer);
    let store = BlobStore::new(MemoryPersistenceDriver::new(), 16 * 1024 * 1024);
    let spy = Arc::new(SpyContentServerClient::default());
    let mut ctrl = WebRtcController::new(Arc::new(DiscardTransport), spy.clone(), forwarding, store, Duration::from_secs(5));
    ctrl.set_content_servers(vec!["https://blossom.example".to_owned()]);

    let bare_cid = Cid::bare(Hash::from_bytes(&[9u8; 32]).unwrap());
    let result = ctrl.put_blob(b"secret", &bare_cid, true, "token").await;

    assert!(matches!(result, Err(PeerError::Store(_))));
    assert_eq!(spy.upload_calls.load(Ordering::SeqCst), 0);
}

/// Scenario: a response whose payload doesn't hash to the claimed content id
/// is discarded, and the forward entry is left in place (it is still
/// waiting for a correct response or a timeout, not silently cleared).
#[tokio::test]
async fn response_hash_mismatch_leaves_the_forward_entry_in_place() {
    let mut ctrl = test_controller();
    connect(&mut ctrl, "peer-c");
    connect(&mut ctrl, "peer-d");

    let hash = Hash::from_bytes(&[3u8; 32]).unwrap();
    ctrl.handle_request("requester", RequestFrame { hash, htl: 4 }).await.unwrap();
    assert_eq!(ctrl.in_flight_forwards(), 1);

    let tampered = ResponseFragment { hash, seq: 0, last: true, payload: b"not the right bytes".to_vec() };
    ctrl.handle_response_fragment("peer-c", tampered, Instant::now()).await.unwrap();

    assert_eq!(ctrl.in_flight_forwards(), 1, "mismatched response must not resolve the forward");
    assert!(ctrl.stats().unwrap().items == 0, "mismatched payload is never written to the store");
}

/// Scenario: a hello event past its expiration tag decodes to nothing, while
/// an otherwise-identical fresh hello decodes normally.
#[tokio::test]
async fn expired_hello_is_dropped_but_a_fresh_one_decodes() {
    use hashswarm_protocol::signaling::{RelayEvent, SIGNALING_KIND};
    use hashswarm_signaling::codec::decode;
    use hashswarm_test_support::FakeGiftWrap;

    let gift_wrap = FakeGiftWrap::new();
    let now_sec = 10_000;

    let expired = RelayEvent {
        id: "evt-expired".to_owned(),
        pubkey: "peer-pk".to_owned(),
        created_at: now_sec - 5,
        kind: SIGNALING_KIND,
        tags: vec![
            vec!["l".to_owned(), "hello".to_owned()],
            vec!["peerId".to_owned(), "peer-uuid".to_owned()],
            vec!["expiration".to_owned(), (now_sec - 1).to_string()],
        ],
        content: String::new(),
    };
    assert!(decode(&expired, now_sec, &gift_wrap).await.unwrap().is_none());

    let fresh = RelayEvent {
        id: "evt-fresh".to_owned(),
        pubkey: "peer-pk".to_owned(),
        created_at: now_sec - 5,
        kind: SIGNALING_KIND,
        tags: vec![
            vec!["l".to_owned(), "hello".to_owned()],
            vec!["peerId".to_owned(), "peer-uuid".to_owned()],
            vec!["expiration".to_owned(), (now_sec + 300).to_string()],
        ],
        content: String::new(),
    };
    let decoded = decode(&fresh, now_sec, &gift_wrap).await.unwrap().expect("fresh hello decodes");
    assert_eq!(decoded.sender_pubkey, "peer-pk");
}

//! Fragment reassembly (spec §4.3): one buffer per `(peerId, hash)`,
//! accumulating sequenced `ResponseFragment`s until either the terminal
//! fragment arrives or the per-hash window elapses.

use hashswarm_protocol::Hash;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReassemblyKey {
    pub peer_id_hash: u64,
    pub hash: Hash,
}

impl ReassemblyKey {
    pub fn new(peer_id: &str, hash: Hash) -> Self {
        use std::hash::{Hash as _, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        peer_id.hash(&mut hasher);
        Self {
            peer_id_hash: hasher.finish(),
            hash,
        }
    }
}

struct Entry {
    fragments: BTreeMap<u32, Vec<u8>>,
    complete_seq: Option<u32>,
    deadline: Instant,
}

/// Accumulates response fragments per `(peer, hash)` and reports completion
/// or expiry. The caller (the controller) is responsible for polling
/// `expired` on its own schedule and for calling `cancel` when it gives up,
/// matching the non-suspending/suspending split in spec §5.
pub struct ReassemblyBuffer {
    entries: HashMap<ReassemblyKey, Entry>,
    window: Duration,
}

impl ReassemblyBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
        }
    }

    /// Feed one fragment in. Returns `Some(bytes)` once the terminal fragment
    /// has arrived and every preceding sequence number is present; the entry
    /// is removed in that case. Otherwise returns `None` and keeps buffering.
    pub fn accept(
        &mut self,
        peer_id: &str,
        hash: Hash,
        seq: u32,
        last: bool,
        payload: Vec<u8>,
        now: Instant,
    ) -> Option<Vec<u8>> {
        let key = ReassemblyKey::new(peer_id, hash);
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            fragments: BTreeMap::new(),
            complete_seq: None,
            deadline: now + self.window,
        });
        entry.fragments.insert(seq, payload);
        if last {
            entry.complete_seq = Some(seq);
        }

        let Some(complete_seq) = entry.complete_seq else {
            return None;
        };
        let contiguous = (0..=complete_seq).all(|s| entry.fragments.contains_key(&s));
        if !contiguous {
            return None;
        }

        let entry = self.entries.remove(&key).unwrap();
        let mut out = Vec::new();
        for seq in 0..=complete_seq {
            out.extend_from_slice(&entry.fragments[&seq]);
        }
        Some(out)
    }

    /// Drop every entry whose deadline has elapsed. Returns the keys dropped
    /// so the caller can call `cancelForward` for each (resolveForward is
    /// never called for a reassembly that failed this way, per spec §4.3).
    pub fn expire(&mut self, now: Instant) -> Vec<ReassemblyKey> {
        let expired: Vec<ReassemblyKey> = self
            .entries
            .iter()
            .filter(|(_, e)| now >= e.deadline)
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }

    /// Drop every buffer associated with a disconnected peer.
    pub fn drain_peer(&mut self, peer_id: &str) {
        let dead_hash = {
            use std::hash::{Hash as _, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            peer_id.hash(&mut hasher);
            hasher.finish()
        };
        self.entries.retain(|k, _| k.peer_id_hash != dead_hash);
    }
}

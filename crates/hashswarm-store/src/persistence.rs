//! The `PersistenceDriver` consumed interface (spec §6) and its in-memory
//! implementation. This is the native-host stand-in for the out-of-scope
//! IndexedDB-backed driver named in §1: `BlobStore` only ever talks to this
//! trait, so the backing store is swappable without touching eviction or
//! privacy-guard logic.

use hashswarm_protocol::Hash;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },
    #[error("privacy violation: {0}")]
    PrivacyViolation(&'static str),
    #[error("persistence backend: {0}")]
    Backend(String),
}

/// Durable byte storage keyed by content hash. Implementations track enough
/// recency information to support `evict`'s least-recently-touched order;
/// `get` counts as a touch, `put` (re-)admits the hash as most recent.
pub trait PersistenceDriver: Send {
    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> Result<(), StoreError>;
    fn get(&mut self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError>;
    fn has(&self, hash: &Hash) -> Result<bool, StoreError>;
    fn delete(&mut self, hash: &Hash) -> Result<(), StoreError>;
    fn count(&self) -> Result<u64, StoreError>;
    fn total_bytes(&self) -> Result<u64, StoreError>;
    /// Delete entries in least-recently-touched order until `total_bytes() <=
    /// max_bytes`. Returns the hashes removed, for logging/observability.
    fn evict(&mut self, max_bytes: u64) -> Result<Vec<Hash>, StoreError>;
}

/// `HashMap`-backed driver for tests and ephemeral/in-process embedding.
/// Recency is tracked with a monotonic logical clock rather than wall time,
/// so eviction order is deterministic under tests.
pub struct MemoryPersistenceDriver {
    entries: std::collections::HashMap<Hash, (Vec<u8>, u64)>,
    clock: u64,
}

impl MemoryPersistenceDriver {
    pub fn new() -> Self {
        Self {
            entries: std::collections::HashMap::new(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl Default for MemoryPersistenceDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceDriver for MemoryPersistenceDriver {
    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> Result<(), StoreError> {
        let t = self.tick();
        self.entries.insert(*hash, (bytes.to_vec(), t));
        Ok(())
    }

    fn get(&mut self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        let t = self.tick();
        match self.entries.get_mut(hash) {
            Some((bytes, last_used)) => {
                *last_used = t;
                Ok(Some(bytes.clone()))
            }
            None => Ok(None),
        }
    }

    fn has(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(hash))
    }

    fn delete(&mut self, hash: &Hash) -> Result<(), StoreError> {
        self.entries.remove(hash);
        Ok(())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.entries.len() as u64)
    }

    fn total_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.entries.values().map(|(b, _)| b.len() as u64).sum())
    }

    fn evict(&mut self, max_bytes: u64) -> Result<Vec<Hash>, StoreError> {
        let mut by_recency: Vec<(Hash, u64, u64)> = self
            .entries
            .iter()
            .map(|(h, (b, t))| (*h, *t, b.len() as u64))
            .collect();
        by_recency.sort_by_key(|(_, t, _)| *t);

        let mut total: u64 = by_recency.iter().map(|(_, _, len)| len).sum();
        let mut evicted = Vec::new();
        for (hash, _, len) in by_recency {
            if total <= max_bytes {
                break;
            }
            self.entries.remove(&hash);
            total -= len;
            evicted.push(hash);
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash {
        Hash([b; 32])
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut d = MemoryPersistenceDriver::new();
        d.put(&h(1), b"hello").unwrap();
        assert_eq!(d.get(&h(1)).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn evict_removes_least_recently_touched_first() {
        let mut d = MemoryPersistenceDriver::new();
        d.put(&h(1), &vec![0u8; 10]).unwrap();
        d.put(&h(2), &vec![0u8; 10]).unwrap();
        d.get(&h(1)).unwrap(); // touch h(1), making h(2) the older one
        let evicted = d.evict(10).unwrap();
        assert_eq!(evicted, vec![h(2)]);
        assert!(d.has(&h(1)).unwrap());
        assert!(!d.has(&h(2)).unwrap());
    }

    #[test]
    fn evict_is_noop_under_budget() {
        let mut d = MemoryPersistenceDriver::new();
        d.put(&h(1), &vec![0u8; 5]).unwrap();
        assert!(d.evict(100).unwrap().is_empty());
    }
}

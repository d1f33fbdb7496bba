//! Wire types shared by every subsystem: content hashes, CIDs, the binary
//! peer-exchange frame format, the signaling envelope shapes, and the HTTP
//! content-server schema. Nothing in this crate talks to a socket; it only
//! defines what goes on the wire and how to parse/serialize it.

use std::fmt;

pub mod frame;
pub mod signaling;

pub const HASH_LEN: usize = 32;
pub const KEY_LEN: usize = 32;

/// A 32-byte content hash, the identity of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(bytes);
        Some(Self(out))
    }

    pub fn from_hex(s: &str) -> Result<Self, ProtocolError> {
        let raw = hex::decode(s).map_err(|_| ProtocolError::MalformedHash)?;
        Self::from_bytes(&raw).ok_or(ProtocolError::MalformedHash)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 32-byte symmetric key used to encrypt a block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SymKey(pub [u8; KEY_LEN]);

impl fmt::Debug for SymKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymKey(..)")
    }
}

/// Content identity: a hash, optionally paired with the key that encrypts it.
/// Uploads must always carry a key (enforced by the privacy guard, not this type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cid {
    pub hash: Hash,
    pub key: Option<SymKey>,
}

impl Cid {
    pub fn encrypted(hash: Hash, key: [u8; KEY_LEN]) -> Self {
        Self {
            hash,
            key: Some(SymKey(key)),
        }
    }

    pub fn bare(hash: Hash) -> Self {
        Self { hash, key: None }
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed hash")]
    MalformedHash,
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("unknown frame type byte {0:#x}")]
    UnknownFrameType(u8),
}

/// Source a `getBlob` call resolved the bytes from. Mirrors the client-facing
/// vocabulary from the data model: local persistence, an HTTP content server,
/// or the peer-to-peer fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobSource {
    Idb,
    Blossom,
    P2p,
}

/// Snapshot of the local cache, returned by the client API's `getStorageStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StorageStats {
    pub items: u64,
    pub bytes: u64,
    pub max_bytes: u64,
}

/// Per-peer counters, reported on the node's `/stats` surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub forwarded_requests: u64,
    pub forwarded_suppressed: u64,
    pub forwarded_resolved: u64,
}

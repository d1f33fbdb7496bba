//! Privacy guard invariants (spec §4.2): uploads must always carry an
//! encryption key, and a hash is only ever served to a peer once the
//! controller has proven it belongs to an encrypted block.

use crate::persistence::StoreError;
use hashswarm_protocol::Cid;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct PrivacyGuard {
    peer_serve_allowlist: HashSet<String>,
}

impl PrivacyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails unless `cid` carries a 32-byte symmetric key. Upload code paths
    /// must call this before any outbound transport.
    pub fn assert_encrypted_upload_cid(&self, cid: &Cid) -> Result<(), StoreError> {
        if cid.is_encrypted() {
            Ok(())
        } else {
            Err(StoreError::PrivacyViolation(
                "upload CID must carry an encryption key",
            ))
        }
    }

    /// Mark hashes as belonging to a proven-encrypted block, making them
    /// eligible to serve over peer channels.
    pub fn mark_encrypted_hashes(&mut self, hash_keys: impl IntoIterator<Item = String>) {
        for key in hash_keys {
            self.peer_serve_allowlist.insert(key.to_ascii_lowercase());
        }
    }

    pub fn should_serve_hash_to_peer(&self, hash_key: &str) -> bool {
        self.peer_serve_allowlist
            .contains(&hash_key.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashswarm_protocol::Hash;

    #[test]
    fn bare_cid_fails_upload_assertion() {
        let guard = PrivacyGuard::new();
        let cid = Cid::bare(Hash([1u8; 32]));
        assert!(guard.assert_encrypted_upload_cid(&cid).is_err());
    }

    #[test]
    fn encrypted_cid_passes_upload_assertion() {
        let guard = PrivacyGuard::new();
        let cid = Cid::encrypted(Hash([1u8; 32]), [2u8; 32]);
        assert!(guard.assert_encrypted_upload_cid(&cid).is_ok());
    }

    #[test]
    fn serve_allowlist_is_case_insensitive() {
        let mut guard = PrivacyGuard::new();
        guard.mark_encrypted_hashes(["AABB".to_owned()]);
        assert!(guard.should_serve_hash_to_peer("aabb"));
        assert!(!guard.should_serve_hash_to_peer("ccdd"));
    }
}

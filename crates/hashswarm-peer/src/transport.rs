//! Consumed interfaces for the data-channel wire (spec §6) and the HTTP
//! content-server fallback. The actual WebRTC/ICE machinery and HTTP client
//! plumbing live outside the core; this module only states the traits the
//! controller dispatches through, plus one `reqwest`-based implementation of
//! the content-server client (this codebase already depends on `reqwest`
//! with `rustls` in its service binaries).

use async_trait::async_trait;
use hashswarm_protocol::Hash;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Backpressure signal the data-channel transport emits when its send
/// buffer crosses a configured watermark (spec §4.3). The transport itself
/// is out of scope for this core (see the module doc above); the owning
/// driving loop is expected to learn of these transitions from whatever
/// concrete data-channel implementation it wires up and report them via
/// `WebRtcController::on_buffer_watermark`, the same push shape already
/// used for `Timer`'s fired-token channel in `hashswarm-forwarding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferWatermark {
    High,
    Low,
}

/// The per-peer binary data-channel, abstracted away from WebRTC/ICE.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, peer_id: &str, bytes: Vec<u8>) -> Result<(), TransportError>;
    async fn close(&self, peer_id: &str);
}

/// Read/write access to HTTP content-addressed servers (spec §6).
#[async_trait]
pub trait ContentServerClient: Send + Sync {
    /// `HEAD /{hex-hash}` — returns true if the server reports having the blob.
    async fn probe(&self, base_url: &str, hash: &Hash) -> Result<bool, TransportError>;
    /// `GET /{hex-hash}` (falling back to `.bin`) — returns the bytes if found.
    async fn fetch(&self, base_url: &str, hash: &Hash) -> Result<Option<Vec<u8>>, TransportError>;
    /// `PUT /upload` with a caller-supplied signed auth token.
    async fn upload(&self, base_url: &str, auth_token: &str, data: Vec<u8>) -> Result<(), TransportError>;
}

/// `reqwest`-backed `ContentServerClient`.
pub struct ReqwestContentServerClient {
    client: reqwest::Client,
}

impl ReqwestContentServerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestContentServerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentServerClient for ReqwestContentServerClient {
    async fn probe(&self, base_url: &str, hash: &Hash) -> Result<bool, TransportError> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), hash.to_hex());
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    async fn fetch(&self, base_url: &str, hash: &Hash) -> Result<Option<Vec<u8>>, TransportError> {
        let base = base_url.trim_end_matches('/');
        for suffix in ["", ".bin"] {
            let url = format!("{base}/{}{suffix}", hash.to_hex());
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| TransportError::Unavailable(e.to_string()))?;
            if resp.status().is_success() {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| TransportError::Unavailable(e.to_string()))?;
                return Ok(Some(bytes.to_vec()));
            }
        }
        Ok(None)
    }

    async fn upload(&self, base_url: &str, auth_token: &str, data: Vec<u8>) -> Result<(), TransportError> {
        let url = format!("{}/upload", base_url.trim_end_matches('/'));
        let resp = self
            .client
            .put(url)
            .header("Authorization", auth_token)
            .body(data)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Unavailable(format!(
                "upload rejected: {}",
                resp.status()
            )))
        }
    }
}

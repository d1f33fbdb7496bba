//! `NodeError`: the aggregate error root for the node binary. Every
//! subsystem error converts into it via `#[from]` so `main` can propagate
//! with one `?`-chain and a single fatal-exit path (spec §7/§10.2).

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] hashswarm_store::StoreError),
    #[error(transparent)]
    Peer(#[from] hashswarm_peer::PeerError),
    #[error(transparent)]
    Signaling(#[from] hashswarm_signaling::SignalingError),
    #[error("status http: {0}")]
    StatusHttp(std::io::Error),
}

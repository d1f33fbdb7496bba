//! Peer records/pools, fragment reassembly, the `WebRtcController`, and the
//! `PeerTransport`/`ContentServerClient` consumed-interface traits (spec
//! §4.3, §4.4). This crate wires `hashswarm-forwarding`, `hashswarm-store`,
//! and `hashswarm-bandwidth` together into the request/response dispatch
//! loop that is the core's hard engineering (spec §2).

pub mod controller;
pub mod peer;
pub mod reassembly;
pub mod transport;

pub use controller::{PeerError, WebRtcController};
pub use peer::{PeerDirection, PeerPool, PeerRecord, PeerState, default_htl};
pub use reassembly::ReassemblyBuffer;
pub use transport::{BufferWatermark, ContentServerClient, PeerTransport, ReqwestContentServerClient, TransportError};

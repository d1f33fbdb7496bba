//! Shared fakes for exercising the forwarding machine, the signaling codec,
//! and the peer controller without real time, a real relay connection, or
//! real WebRTC data channels. Dev-only by convention; every other crate
//! pulls this in as a dependency only to reach it from `#[cfg(test)]` code
//! (the forwarding/signaling crates) or from integration tests (everything
//! else), never from production code paths.

mod fake_gift_wrap;
mod fake_relay;
mod in_memory_transport;
mod virtual_clock;

pub use fake_gift_wrap::FakeGiftWrap;
pub use fake_relay::FakeRelayBus;
pub use in_memory_transport::InMemoryTransport;
pub use virtual_clock::VirtualClock;

//! JSON shapes exchanged over the signaling relay (spec §3/§4.5). The codec
//! itself (filters, gift-wrap, event-age filtering) lives in `hashswarm-signaling`;
//! this module only defines the envelope and the canonical/legacy message shapes.

use serde::{Deserialize, Serialize};

pub const SIGNALING_KIND: u32 = 25050;

/// A relay event as it appears on the bus, independent of nostr-crate choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    /// `["tag_name", value, ...]` tuples, matching the relay's tag array shape.
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl RelayEvent {
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    pub fn has_tag(&self, name: &str, value: &str) -> bool {
        self.tags
            .iter()
            .any(|t| t.first().map(String::as_str) == Some(name) && t.get(1).map(String::as_str) == Some(value))
    }
}

/// The canonical, normalized directed-signaling payload. Wire shape is
/// camelCase (`peerId`, `targetPeerId`) to match the relay's JSON, not Rust
/// field-naming convention. Legacy shapes (bare `recipient` field, `sdp`/
/// `candidate` nested under `offer`/`answer`/`candidate`) are folded into
/// this shape at decode time by `LegacyDirectedPayload::normalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalingMessage {
    Hello {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    Offer {
        #[serde(rename = "peerId")]
        peer_id: String,
        #[serde(rename = "targetPeerId")]
        target_peer_id: String,
        sdp: String,
    },
    Answer {
        #[serde(rename = "peerId")]
        peer_id: String,
        #[serde(rename = "targetPeerId")]
        target_peer_id: String,
        sdp: String,
    },
    Candidate {
        #[serde(rename = "peerId")]
        peer_id: String,
        #[serde(rename = "targetPeerId")]
        target_peer_id: String,
        candidate: String,
    },
    Candidates {
        #[serde(rename = "peerId")]
        peer_id: String,
        #[serde(rename = "targetPeerId")]
        target_peer_id: String,
        candidates: Vec<String>,
    },
}

/// `sdp`/`candidate` nested under the type key in the oldest legacy shape,
/// e.g. `{"type":"offer","offer":{"sdp":"..."}}` instead of a top-level
/// `sdp` field.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyNestedBody {
    pub sdp: Option<String>,
    pub candidate: Option<String>,
    pub candidates: Option<Vec<String>>,
}

/// The shape directed-signaling payloads were historically published in,
/// before `targetPeerId` replaced the ambiguous `recipient` field and
/// `sdp`/`candidate` moved out of a type-named nested object to the top
/// level.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyDirectedPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "peerId")]
    pub peer_id: String,
    pub recipient: Option<String>,
    #[serde(rename = "targetPeerId")]
    pub target_peer_id: Option<String>,
    pub sdp: Option<String>,
    pub candidates: Option<Vec<String>>,
    pub offer: Option<LegacyNestedBody>,
    pub answer: Option<LegacyNestedBody>,
    /// The `candidate` key itself is overloaded in the wild: either a bare
    /// ICE candidate string, or (oldest shape) an object nesting it under
    /// its own `candidate` field. `serde_json::Value` defers the choice to
    /// `normalize`.
    pub candidate: Option<serde_json::Value>,
}

impl LegacyDirectedPayload {
    /// Fold a legacy or current payload into the canonical tagged variant.
    /// `qualify` normalizes a bare peer id into `<senderPubkey>:<uuid>` when
    /// it does not already contain the `:` separator.
    pub fn normalize(self, qualify: impl Fn(&str) -> String) -> Option<SignalingMessage> {
        let peer_id = qualify(&self.peer_id);
        let target_peer_id = self
            .target_peer_id
            .or(self.recipient)
            .map(|r| qualify(&r))
            .unwrap_or_default();
        let nested = self.offer.or(self.answer);
        let sdp = self.sdp.or_else(|| nested.as_ref().and_then(|n| n.sdp.clone()));
        let candidate = self.candidate.and_then(|value| match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => map.get("candidate")?.as_str().map(str::to_owned),
            _ => None,
        });
        let candidates = self
            .candidates
            .or_else(|| nested.as_ref().and_then(|n| n.candidates.clone()));
        match self.kind.as_str() {
            "offer" => Some(SignalingMessage::Offer {
                peer_id,
                target_peer_id,
                sdp: sdp?,
            }),
            "answer" => Some(SignalingMessage::Answer {
                peer_id,
                target_peer_id,
                sdp: sdp?,
            }),
            "candidate" => Some(SignalingMessage::Candidate {
                peer_id,
                target_peer_id,
                candidate: candidate?,
            }),
            "candidates" => Some(SignalingMessage::Candidates {
                peer_id,
                target_peer_id,
                candidates: candidates?,
            }),
            _ => None,
        }
    }
}

use crate::{EventFilter, GiftWrap, RelayBus, SignalingError, UnsignedEvent};
use hashswarm_protocol::signaling::{
    LegacyDirectedPayload, RelayEvent, SignalingMessage, SIGNALING_KIND,
};

pub const MAX_EVENT_AGE_SEC: i64 = 30;
const HELLO_EXPIRATION_SEC: i64 = 300;

pub fn hello_filter(now_sec: i64) -> EventFilter {
    EventFilter {
        kinds: vec![SIGNALING_KIND],
        l_tag: Some(vec!["hello".to_owned()]),
        p_tag: None,
        since: now_sec - MAX_EVENT_AGE_SEC,
    }
}

pub fn directed_filter(my_pubkey: &str, now_sec: i64) -> EventFilter {
    EventFilter {
        kinds: vec![SIGNALING_KIND],
        l_tag: None,
        p_tag: Some(vec![my_pubkey.to_owned()]),
        since: now_sec - MAX_EVENT_AGE_SEC,
    }
}

/// Publish a signaling message. `recipient_pubkey` selects the shape: `None`
/// broadcasts a plain hello event, `Some` gift-wraps a directed payload.
pub async fn send(
    message: &SignalingMessage,
    recipient_pubkey: Option<&str>,
    now_sec: i64,
    bus: &dyn RelayBus,
    gift_wrap: &dyn GiftWrap,
) -> Result<(), SignalingError> {
    match recipient_pubkey {
        None => {
            let SignalingMessage::Hello { peer_id } = message else {
                return Err(SignalingError::Bus(
                    "broadcast send requires a Hello message".to_owned(),
                ));
            };
            let template = UnsignedEvent {
                kind: SIGNALING_KIND,
                tags: vec![
                    vec!["l".to_owned(), "hello".to_owned()],
                    vec!["peerId".to_owned(), peer_id.clone()],
                    vec![
                        "expiration".to_owned(),
                        (now_sec + HELLO_EXPIRATION_SEC).to_string(),
                    ],
                ],
                content: String::new(),
                created_at: now_sec,
            };
            let event = bus.sign_event(template).await?;
            bus.publish(event).await
        }
        Some(recipient) => {
            let inner_json = serde_json::to_string(message)?;
            let wrapped = gift_wrap.wrap(inner_json, recipient).await?;
            bus.publish(wrapped).await
        }
    }
}

/// A decoded signaling message along with the relay identity that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSignal {
    pub sender_pubkey: String,
    pub message: SignalingMessage,
}

/// Decode one relay event. Returns `Ok(None)` for events that are expired,
/// not signaling traffic, or fail to gift-unwrap — these are not errors,
/// just nothing to act on.
pub async fn decode(
    event: &RelayEvent,
    now_sec: i64,
    gift_wrap: &dyn GiftWrap,
) -> Result<Option<DecodedSignal>, SignalingError> {
    if event.kind != SIGNALING_KIND {
        return Ok(None);
    }
    if now_sec - event.created_at > MAX_EVENT_AGE_SEC {
        return Ok(None);
    }
    if let Some(exp) = event.tag_value("expiration").and_then(|v| v.parse::<i64>().ok()) {
        if exp < now_sec {
            return Ok(None);
        }
    }

    if event.has_tag("l", "hello") {
        let Some(peer_id) = event.tag_value("peerId") else {
            return Ok(None);
        };
        return Ok(Some(DecodedSignal {
            sender_pubkey: event.pubkey.clone(),
            message: SignalingMessage::Hello {
                peer_id: peer_id.to_owned(),
            },
        }));
    }

    let Some(content) = gift_wrap.unwrap(event).await? else {
        return Ok(None);
    };
    if content.is_empty() {
        return Ok(None);
    }

    let sender_pubkey = event.pubkey.clone();
    let qualify = |id: &str| {
        if id.contains(':') {
            id.to_owned()
        } else {
            format!("{sender_pubkey}:{id}")
        }
    };

    if let Ok(canonical) = serde_json::from_str::<SignalingMessage>(&content) {
        return Ok(Some(DecodedSignal {
            sender_pubkey: event.pubkey.clone(),
            message: canonical,
        }));
    }
    let Ok(legacy) = serde_json::from_str::<LegacyDirectedPayload>(&content) else {
        return Ok(None);
    };
    let Some(message) = legacy.normalize(qualify) else {
        return Ok(None);
    };
    Ok(Some(DecodedSignal {
        sender_pubkey: event.pubkey,
        message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashswarm_test_support::{FakeGiftWrap, FakeRelayBus};

    fn hello_event(peer_id: &str, created_at: i64, expiration: Option<i64>) -> RelayEvent {
        let mut tags = vec![
            vec!["l".to_owned(), "hello".to_owned()],
            vec!["peerId".to_owned(), peer_id.to_owned()],
        ];
        if let Some(exp) = expiration {
            tags.push(vec!["expiration".to_owned(), exp.to_string()]);
        }
        RelayEvent {
            id: "evt1".to_owned(),
            pubkey: "sender-pk".to_owned(),
            created_at,
            kind: SIGNALING_KIND,
            tags,
            content: String::new(),
        }
    }

    #[tokio::test]
    async fn hello_round_trips_through_send_and_decode() {
        let bus = FakeRelayBus::new();
        let gift_wrap = FakeGiftWrap::new();
        let msg = SignalingMessage::Hello {
            peer_id: "uuid-xyz".to_owned(),
        };
        send(&msg, None, 1_000, &bus, &gift_wrap).await.unwrap();
        let event = bus.take_published().pop().unwrap();
        let decoded = decode(&event, 1_000, &gift_wrap).await.unwrap().unwrap();
        assert_eq!(decoded.message, msg);
    }

    #[tokio::test]
    async fn directed_offer_round_trips_through_send_and_decode() {
        let bus = FakeRelayBus::new();
        let gift_wrap = FakeGiftWrap::new();
        let msg = SignalingMessage::Offer {
            peer_id: "pk-a:uuid-1".to_owned(),
            target_peer_id: "pk-b:uuid-2".to_owned(),
            sdp: "v=0...".to_owned(),
        };
        send(&msg, Some("pk-b"), 1_000, &bus, &gift_wrap).await.unwrap();
        let event = bus.take_published().pop().unwrap();
        let decoded = decode(&event, 1_000, &gift_wrap).await.unwrap().unwrap();
        assert_eq!(decoded.message, msg);
    }

    #[tokio::test]
    async fn expired_event_by_age_decodes_to_none() {
        let gift_wrap = FakeGiftWrap::new();
        let event = hello_event("uuid-xyz", 1_000 - 120, None);
        assert!(decode(&event, 1_000, &gift_wrap).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_event_by_explicit_expiration_decodes_to_none() {
        let gift_wrap = FakeGiftWrap::new();
        let event = hello_event("uuid-xyz", 1_000, Some(999));
        assert!(decode(&event, 1_000, &gift_wrap).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_hello_decodes_with_sender_pubkey() {
        let gift_wrap = FakeGiftWrap::new();
        let event = hello_event("uuid-xyz", 1_000, Some(2_000));
        let decoded = decode(&event, 1_000, &gift_wrap).await.unwrap().unwrap();
        assert_eq!(decoded.sender_pubkey, "sender-pk");
        assert_eq!(
            decoded.message,
            SignalingMessage::Hello {
                peer_id: "uuid-xyz".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn legacy_directed_payload_normalizes_on_decode() {
        let gift_wrap = FakeGiftWrap::new();
        let legacy_json = serde_json::json!({
            "type": "offer",
            "peerId": "uuid-1",
            "recipient": "uuid-2",
            "sdp": "v=0",
        })
        .to_string();
        let wrapped = gift_wrap.wrap(legacy_json, "pk-b").await.unwrap();
        let decoded = decode(&wrapped, wrapped.created_at, &gift_wrap)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            decoded.message,
            SignalingMessage::Offer {
                peer_id: format!("{}:uuid-1", decoded.sender_pubkey),
                target_peer_id: format!("{}:uuid-2", decoded.sender_pubkey),
                sdp: "v=0".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn empty_gift_unwrap_decodes_to_none() {
        let gift_wrap = FakeGiftWrap::new();
        let event = gift_wrap.wrap(String::new(), "pk-b").await.unwrap();
        assert!(decode(&event, event.created_at, &gift_wrap)
            .await
            .unwrap()
            .is_none());
    }
}

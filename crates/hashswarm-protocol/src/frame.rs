//! Binary framing for the peer data-channel wire format (spec §4.3/§6).
//!
//! Request:  0x01 ‖ hash(32) ‖ htl(1)
//! Response: 0x02 ‖ hash(32) ‖ seq(u32 BE) ‖ last(1 byte, 0/1) ‖ payload

use crate::{Hash, HASH_LEN, ProtocolError};

const TYPE_REQUEST: u8 = 0x01;
const TYPE_RESPONSE: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub hash: Hash,
    pub htl: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFragment {
    pub hash: Hash,
    pub seq: u32,
    pub last: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(RequestFrame),
    Response(ResponseFragment),
}

impl RequestFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + HASH_LEN + 1);
        out.push(TYPE_REQUEST);
        out.extend_from_slice(self.hash.as_bytes());
        out.push(self.htl);
        out
    }

    /// A copy of this request with the hop-to-live decremented by one.
    /// Saturates at zero; callers must check `htl > 1` before forwarding.
    pub fn decremented(&self) -> Self {
        Self {
            hash: self.hash,
            htl: self.htl.saturating_sub(1),
        }
    }
}

impl ResponseFragment {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + HASH_LEN + 4 + 1 + self.payload.len());
        out.push(TYPE_RESPONSE);
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.push(u8::from(self.last));
        out.extend_from_slice(&self.payload);
        out
    }

    /// On-wire byte count for bandwidth accounting: framing overhead plus payload.
    pub fn wire_len(&self) -> u64 {
        (1 + HASH_LEN + 4 + 1 + self.payload.len()) as u64
    }
}

impl RequestFrame {
    pub fn wire_len() -> u64 {
        (1 + HASH_LEN + 1) as u64
    }
}

pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let (&type_byte, rest) = bytes
        .split_first()
        .ok_or(ProtocolError::MalformedFrame("empty frame"))?;
    match type_byte {
        TYPE_REQUEST => {
            if rest.len() != HASH_LEN + 1 {
                return Err(ProtocolError::MalformedFrame("request length"));
            }
            let hash = Hash::from_bytes(&rest[..HASH_LEN]).ok_or(ProtocolError::MalformedHash)?;
            Ok(Frame::Request(RequestFrame {
                hash,
                htl: rest[HASH_LEN],
            }))
        }
        TYPE_RESPONSE => {
            if rest.len() < HASH_LEN + 4 + 1 {
                return Err(ProtocolError::MalformedFrame("response header"));
            }
            let hash = Hash::from_bytes(&rest[..HASH_LEN]).ok_or(ProtocolError::MalformedHash)?;
            let seq = u32::from_be_bytes(rest[HASH_LEN..HASH_LEN + 4].try_into().unwrap());
            let last = rest[HASH_LEN + 4] != 0;
            let payload = rest[HASH_LEN + 5..].to_vec();
            Ok(Frame::Response(ResponseFragment {
                hash,
                seq,
                last,
                payload,
            }))
        }
        other => Err(ProtocolError::UnknownFrameType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let f = RequestFrame {
            hash: Hash([3u8; HASH_LEN]),
            htl: 6,
        };
        let decoded = decode(&f.encode()).unwrap();
        assert_eq!(decoded, Frame::Request(f));
    }

    #[test]
    fn response_round_trip() {
        let f = ResponseFragment {
            hash: Hash([4u8; HASH_LEN]),
            seq: 2,
            last: true,
            payload: vec![1, 2, 3, 4],
        };
        let decoded = decode(&f.encode()).unwrap();
        assert_eq!(decoded, Frame::Response(f));
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let f = RequestFrame {
            hash: Hash([0u8; HASH_LEN]),
            htl: 0,
        };
        assert_eq!(f.decremented().htl, 0);
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = decode(&[0xFF]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownFrameType(0xFF)));
    }

    #[test]
    fn decode_rejects_truncated_request() {
        let mut bytes = RequestFrame {
            hash: Hash([1u8; HASH_LEN]),
            htl: 3,
        }
        .encode();
        bytes.truncate(bytes.len() - 1);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn response_wire_len_includes_framing_overhead() {
        let f = ResponseFragment {
            hash: Hash([0u8; HASH_LEN]),
            seq: 0,
            last: true,
            payload: vec![0u8; 10],
        };
        assert_eq!(f.wire_len(), (1 + HASH_LEN + 4 + 1 + 10) as u64);
    }
}

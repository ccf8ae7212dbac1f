//! First/follow-on fragment encode and decode.
//!
//! Factored out as a leaf module because the Gateway Buffer
//! ([`crate::gateway`]) and the Endpoint Reassembler
//! ([`crate::reassembler`]) must agree byte-for-byte on this layout; both
//! call into the free functions here rather than each hand-rolling the
//! same bit pattern.

use crate::{OnionError, Result};

/// Where a fragment's inner message is ultimately delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryType {
    Local,
    Tunnel,
    Router,
}

impl DeliveryType {
    fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(DeliveryType::Local),
            1 => Ok(DeliveryType::Tunnel),
            2 => Ok(DeliveryType::Router),
            other => Err(OnionError::BadFragment(format!(
                "unknown delivery type bits {other:#04b}"
            ))),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            DeliveryType::Local => 0,
            DeliveryType::Tunnel => 1,
            DeliveryType::Router => 2,
        }
    }
}

/// Where a first fragment's inner message is addressed, fully resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryInstructions {
    Local,
    Tunnel { hash: [u8; 32], tunnel_id: u32 },
    Router { hash: [u8; 32] },
}

impl DeliveryInstructions {
    pub fn delivery_type(&self) -> DeliveryType {
        match self {
            DeliveryInstructions::Local => DeliveryType::Local,
            DeliveryInstructions::Tunnel { .. } => DeliveryType::Tunnel,
            DeliveryInstructions::Router { .. } => DeliveryType::Router,
        }
    }

    /// Encoded length of the delivery-instructions prefix alone (flag
    /// byte plus any hash/tunnel-ID fields), excluding message ID and
    /// size.
    pub fn encoded_len(&self) -> usize {
        match self {
            DeliveryInstructions::Local => 1,
            DeliveryInstructions::Router { .. } => 1 + 32,
            DeliveryInstructions::Tunnel { .. } => 1 + 32 + 4,
        }
    }
}

/// A decoded first fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirstFragment<'a> {
    pub instructions: DeliveryInstructions,
    /// Present iff the fragmented-continuation bit is set.
    pub message_id: Option<u32>,
    pub data: &'a [u8],
}

/// A decoded follow-on fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowOnFragment<'a> {
    pub sequence: u8,
    pub is_last: bool,
    pub message_id: u32,
    pub data: &'a [u8],
}

/// Encode a first fragment into `out`, returning the number of bytes
/// written. `fragmented` indicates whether this fragment is only a
/// prefix of the inner message, in which case `message_id` must be
/// `Some`.
pub fn encode_first_fragment(
    instructions: &DeliveryInstructions,
    message_id: Option<u32>,
    data: &[u8],
    out: &mut Vec<u8>,
) {
    let mut flag = instructions.delivery_type().to_bits() << 5;
    if message_id.is_some() {
        flag |= 0x08;
    }
    out.push(flag);
    match instructions {
        DeliveryInstructions::Local => {}
        DeliveryInstructions::Router { hash } => out.extend_from_slice(hash),
        DeliveryInstructions::Tunnel { hash, tunnel_id } => {
            out.extend_from_slice(hash);
            out.extend_from_slice(&tunnel_id.to_be_bytes());
        }
    }
    if let Some(id) = message_id {
        out.extend_from_slice(&id.to_be_bytes());
    }
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

/// Decode a first fragment from the front of `buf`. Returns the
/// decoded fragment and the number of bytes it occupied.
pub fn decode_first_fragment(buf: &[u8]) -> Result<(FirstFragment<'_>, usize)> {
    if buf.is_empty() {
        return Err(OnionError::BadFragment("empty buffer".into()));
    }
    let flag = buf[0];
    if flag & 0x80 != 0 {
        return Err(OnionError::BadFragment(
            "first-fragment bit 7 must be clear".into(),
        ));
    }
    let delivery_type = DeliveryType::from_bits((flag >> 5) & 0x03)?;
    let fragmented = flag & 0x08 != 0;
    let mut pos = 1;

    let instructions = match delivery_type {
        DeliveryType::Local => DeliveryInstructions::Local,
        DeliveryType::Router => {
            let hash = take_array::<32>(buf, &mut pos)?;
            DeliveryInstructions::Router { hash }
        }
        DeliveryType::Tunnel => {
            let hash = take_array::<32>(buf, &mut pos)?;
            let tunnel_id = u32::from_be_bytes(take_array::<4>(buf, &mut pos)?);
            DeliveryInstructions::Tunnel { hash, tunnel_id }
        }
    };

    let message_id = if fragmented {
        Some(u32::from_be_bytes(take_array::<4>(buf, &mut pos)?))
    } else {
        None
    };

    let size = u16::from_be_bytes(take_array::<2>(buf, &mut pos)?) as usize;
    let data = take_slice(buf, &mut pos, size)?;

    Ok((
        FirstFragment {
            instructions,
            message_id,
            data,
        },
        pos,
    ))
}

/// Encode a follow-on fragment into `out`.
pub fn encode_follow_on_fragment(sequence: u8, is_last: bool, message_id: u32, data: &[u8], out: &mut Vec<u8>) {
    let mut flag = 0x80 | (sequence << 1);
    if is_last {
        flag |= 0x01;
    }
    out.push(flag);
    out.extend_from_slice(&message_id.to_be_bytes());
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

/// Decode a follow-on fragment from the front of `buf`.
pub fn decode_follow_on_fragment(buf: &[u8]) -> Result<(FollowOnFragment<'_>, usize)> {
    if buf.is_empty() {
        return Err(OnionError::BadFragment("empty buffer".into()));
    }
    let flag = buf[0];
    if flag & 0x80 == 0 {
        return Err(OnionError::BadFragment(
            "follow-on fragment bit 7 must be set".into(),
        ));
    }
    let sequence = (flag >> 1) & 0x3f;
    let is_last = flag & 0x01 != 0;
    let mut pos = 1;
    let message_id = u32::from_be_bytes(take_array::<4>(buf, &mut pos)?);
    let size = u16::from_be_bytes(take_array::<2>(buf, &mut pos)?) as usize;
    let data = take_slice(buf, &mut pos, size)?;

    Ok((
        FollowOnFragment {
            sequence,
            is_last,
            message_id,
            data,
        },
        pos,
    ))
}

fn take_array<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N]> {
    let slice = take_slice(buf, pos, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

fn take_slice<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).ok_or_else(|| OnionError::BadFragment("length overflow".into()))?;
    if end > buf.len() {
        return Err(OnionError::BadFragment("fragment truncated".into()));
    }
    let slice = &buf[*pos..end];
    *pos = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fragment_local_roundtrip() {
        let mut buf = Vec::new();
        encode_first_fragment(&DeliveryInstructions::Local, None, b"hello", &mut buf);
        let (frag, consumed) = decode_first_fragment(&buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(frag.instructions, DeliveryInstructions::Local);
        assert_eq!(frag.message_id, None);
        assert_eq!(frag.data, b"hello");
    }

    #[test]
    fn test_first_fragment_tunnel_fragmented_roundtrip() {
        let instructions = DeliveryInstructions::Tunnel {
            hash: [7u8; 32],
            tunnel_id: 0xabcd_ef01,
        };
        let mut buf = Vec::new();
        encode_first_fragment(&instructions, Some(42), b"partial-payload", &mut buf);
        let (frag, consumed) = decode_first_fragment(&buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(frag.instructions, instructions);
        assert_eq!(frag.message_id, Some(42));
        assert_eq!(frag.data, b"partial-payload");
    }

    #[test]
    fn test_first_fragment_router_no_continuation() {
        let instructions = DeliveryInstructions::Router { hash: [9u8; 32] };
        let mut buf = Vec::new();
        encode_first_fragment(&instructions, None, b"x", &mut buf);
        assert_eq!(buf[0] & 0x08, 0);
        let (frag, _) = decode_first_fragment(&buf).expect("decode");
        assert_eq!(frag.message_id, None);
    }

    #[test]
    fn test_follow_on_fragment_roundtrip() {
        let mut buf = Vec::new();
        encode_follow_on_fragment(3, false, 0x1122_3344, b"more-data", &mut buf);
        assert_eq!(buf[0] & 0x80, 0x80);
        let (frag, consumed) = decode_follow_on_fragment(&buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(frag.sequence, 3);
        assert!(!frag.is_last);
        assert_eq!(frag.message_id, 0x1122_3344);
        assert_eq!(frag.data, b"more-data");
    }

    #[test]
    fn test_follow_on_last_fragment_bit() {
        let mut buf = Vec::new();
        encode_follow_on_fragment(5, true, 1, b"tail", &mut buf);
        let (frag, _) = decode_follow_on_fragment(&buf).expect("decode");
        assert!(frag.is_last);
        assert_eq!(frag.sequence, 5);
    }

    #[test]
    fn test_decode_rejects_truncated_buffer() {
        let instructions = DeliveryInstructions::Local;
        let mut buf = Vec::new();
        encode_first_fragment(&instructions, None, b"12345", &mut buf);
        let short = &buf[..buf.len() - 2];
        assert!(decode_first_fragment(short).is_err());
    }

    #[test]
    fn test_decode_first_rejects_follow_on_bit_set() {
        let buf = [0x80u8, 0, 0, 0, 0, 0, 0];
        assert!(decode_first_fragment(&buf).is_err());
    }

    #[test]
    fn test_decode_follow_on_rejects_first_fragment_bit() {
        let buf = [0x00u8, 0, 0, 0, 0, 0, 0];
        assert!(decode_follow_on_fragment(&buf).is_err());
    }
}

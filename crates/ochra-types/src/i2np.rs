//! I2NP inner-message header framing.
//!
//! The core only ever reads the length field and otherwise treats a
//! message's body opaquely, except for the two types it owns outright
//! (`TunnelData`, `Data`). Every other type round-trips through
//! [`MessageType::Other`] unchanged.

use serde::{Deserialize, Serialize};

/// Size in bytes of an encoded [`I2npHeader`].
pub const HEADER_SIZE: usize = 16;

/// The inner-message type tag.
///
/// Restricted to the two variants this workspace's core owns, plus an
/// escape hatch that preserves any other byte value opaquely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Data,
    TunnelData,
    Other(u8),
}

impl MessageType {
    pub fn to_byte(self) -> u8 {
        match self {
            MessageType::Data => 18,
            MessageType::TunnelData => 20,
            MessageType::Other(b) => b,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            18 => MessageType::Data,
            20 => MessageType::TunnelData,
            other => MessageType::Other(other),
        }
    }
}

/// The fixed header every inner message carries ahead of its body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct I2npHeader {
    pub message_type: MessageType,
    pub message_id: u32,
    pub expiration: u64,
    pub length: u16,
    pub checksum: u8,
}

impl I2npHeader {
    /// Encode this header into its 16-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.message_type.to_byte();
        out[1..5].copy_from_slice(&self.message_id.to_be_bytes());
        out[5..13].copy_from_slice(&self.expiration.to_be_bytes());
        out[13..15].copy_from_slice(&self.length.to_be_bytes());
        out[15] = self.checksum;
        out
    }

    /// Decode a header from its 16-byte wire form.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let message_id = u32::from_be_bytes(bytes[1..5].try_into().ok()?);
        let expiration = u64::from_be_bytes(bytes[5..13].try_into().ok()?);
        let length = u16::from_be_bytes(bytes[13..15].try_into().ok()?);
        Some(Self {
            message_type: MessageType::from_byte(bytes[0]),
            message_id,
            expiration,
            length,
            checksum: bytes[15],
        })
    }
}

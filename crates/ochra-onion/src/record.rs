//! Tunnel Record Codec: the 1028-byte on-wire tunnel record.
//!
//! Layout: `tunnel_id (4B BE) || iv_seed (16B) || payload (1008B)`, where
//! `payload = checksum (4B) || padding || zero separator (1B) ||
//! fragments`. Tunnel crypto is applied separately, over the
//! `iv_seed || payload` region, by the caller — this module only
//! handles framing.

use rand::RngCore;

use crate::{OnionError, Result};

/// Total size of a tunnel record on the wire.
pub const TUNNEL_DATA_MSG_SIZE: usize = 1028;

/// Size of the payload window after the tunnel ID and IV.
pub const TUNNEL_DATA_ENCRYPTED_SIZE: usize = 1008;

/// Maximum fragment bytes a single record can carry.
pub const TUNNEL_DATA_MAX_PAYLOAD_SIZE: usize = 1003;

const TUNNEL_ID_SIZE: usize = 4;
const IV_SIZE: usize = 16;
const CHECKSUM_SIZE: usize = 4;

/// Build a 1028-byte tunnel record from a completed fragment stream.
///
/// `fragments` must be at most [`TUNNEL_DATA_MAX_PAYLOAD_SIZE`] bytes;
/// it is the caller's job (the Gateway Buffer) to have already packed
/// fragments up to that limit. The record is returned unencrypted;
/// tunnel crypto is applied by the caller afterward.
pub fn build_record(tunnel_id: u32, iv_seed: &[u8; IV_SIZE], fragments: &[u8]) -> Result<[u8; TUNNEL_DATA_MSG_SIZE]> {
    if fragments.len() > TUNNEL_DATA_MAX_PAYLOAD_SIZE {
        return Err(OnionError::BadFragment(format!(
            "fragment stream of {} bytes exceeds {} byte window",
            fragments.len(),
            TUNNEL_DATA_MAX_PAYLOAD_SIZE
        )));
    }

    let zero_offset = (TUNNEL_DATA_ENCRYPTED_SIZE - 1) - fragments.len();

    let mut payload = [0u8; TUNNEL_DATA_ENCRYPTED_SIZE];
    if zero_offset > CHECKSUM_SIZE {
        let mut padding = vec![0u8; zero_offset - CHECKSUM_SIZE];
        loop {
            rand::rngs::OsRng.fill_bytes(&mut padding);
            if padding.iter().all(|&b| b != 0) {
                break;
            }
        }
        payload[CHECKSUM_SIZE..zero_offset].copy_from_slice(&padding);
    }
    payload[zero_offset] = 0;
    payload[zero_offset + 1..].copy_from_slice(fragments);

    let checksum = ochra_crypto::sha256::checksum_prefix_concat(&payload[zero_offset + 1..], iv_seed);
    payload[0..CHECKSUM_SIZE].copy_from_slice(&checksum);

    let mut record = [0u8; TUNNEL_DATA_MSG_SIZE];
    record[0..TUNNEL_ID_SIZE].copy_from_slice(&tunnel_id.to_be_bytes());
    record[TUNNEL_ID_SIZE..TUNNEL_ID_SIZE + IV_SIZE].copy_from_slice(iv_seed);
    record[TUNNEL_ID_SIZE + IV_SIZE..].copy_from_slice(&payload);
    Ok(record)
}

/// A parsed tunnel record: framing verified, padding stripped.
pub struct ParsedRecord {
    pub tunnel_id: u32,
    pub iv_seed: [u8; IV_SIZE],
    pub fragments: Vec<u8>,
}

/// Parse and verify a 1028-byte tunnel record, already tunnel-crypto
/// decrypted.
///
/// Fails with [`OnionError::BadPadding`] if no zero separator is found,
/// or [`OnionError::BadChecksum`] if the checksum does not match.
pub fn parse_record(record: &[u8]) -> Result<ParsedRecord> {
    if record.len() != TUNNEL_DATA_MSG_SIZE {
        return Err(OnionError::InvalidLength {
            expected: TUNNEL_DATA_MSG_SIZE,
            actual: record.len(),
        });
    }

    let tunnel_id = u32::from_be_bytes(
        record[0..TUNNEL_ID_SIZE]
            .try_into()
            .expect("slice is exactly TUNNEL_ID_SIZE bytes"),
    );
    let mut iv_seed = [0u8; IV_SIZE];
    iv_seed.copy_from_slice(&record[TUNNEL_ID_SIZE..TUNNEL_ID_SIZE + IV_SIZE]);
    let payload = &record[TUNNEL_ID_SIZE + IV_SIZE..];

    let zero_offset = payload[CHECKSUM_SIZE..]
        .iter()
        .position(|&b| b == 0)
        .map(|i| i + CHECKSUM_SIZE)
        .ok_or(OnionError::BadPadding)?;

    let fragments = &payload[zero_offset + 1..];
    let expected = &payload[0..CHECKSUM_SIZE];
    let actual = ochra_crypto::sha256::checksum_prefix_concat(fragments, &iv_seed);
    if actual[..] != expected[..] {
        return Err(OnionError::BadChecksum);
    }

    Ok(ParsedRecord {
        tunnel_id,
        iv_seed,
        fragments: fragments.to_vec(),
    })
}

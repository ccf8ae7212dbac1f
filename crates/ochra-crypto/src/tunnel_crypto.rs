//! Double-IV tunnel crypto: the per-hop transformation every tunnel
//! record passes through exactly once on its way between two adjacent
//! hops.
//!
//! Over a 1024-byte input (16-byte IV || 1008-byte payload) this
//! produces a 1024-byte output such that:
//!
//! 1. `IV' = ECB_encrypt(ivKey, ECB_encrypt(ivKey, IV_in))` — the
//!    "double IV" pass.
//! 2. `Payload' = CBC_encrypt(layerKey, IV=IV_in_after_first_ECB,
//!    Payload_in)` — the chaining IV is the IV after its *first* ECB
//!    pass, not the doubly-encrypted IV that ships on the wire.
//! 3. Output layout: `IV' || Payload'`.
//!
//! Decryption mirrors the construction: two ECB decrypts recover the
//! chaining IV used for the CBC decrypt of the payload, and the
//! singly-ECB-decrypted IV is emitted as the outgoing IV.
//!
//! The double IV exists so that a malicious participant cannot undo IV
//! randomness with a single ECB inversion and thereby link records
//! across the tunnel.

use crate::aes::{self, CipherBlock, EcbDecryption, EcbEncryption, BLOCK_SIZE};
use crate::{CryptoError, Result};

/// Total size of the IV-plus-payload region a tunnel crypto pass
/// transforms: 16-byte IV followed by 1008 bytes of payload.
pub const TRANSFORM_SIZE: usize = 1024;

/// Size of the payload region within [`TRANSFORM_SIZE`].
pub const PAYLOAD_SIZE: usize = 1008;

/// Per-hop encryption keys, expanded once and reused for every record.
pub struct TunnelEncryption {
    layer: EcbEncryption,
    iv: EcbEncryption,
}

/// Per-hop decryption keys, expanded once and reused for every record.
pub struct TunnelDecryption {
    layer: EcbDecryption,
    iv: EcbDecryption,
}

impl TunnelEncryption {
    /// Expand a 32-byte layer key and a 32-byte IV key.
    pub fn new(layer_key: &[u8; 32], iv_key: &[u8; 32]) -> Self {
        Self {
            layer: EcbEncryption::new(layer_key),
            iv: EcbEncryption::new(iv_key),
        }
    }

    /// Transform a 1024-byte (IV || payload) buffer in place into its
    /// encrypted form.
    ///
    /// `buf.len()` must equal [`TRANSFORM_SIZE`].
    pub fn encrypt(&self, buf: &mut [u8]) -> Result<()> {
        require_transform_size(buf)?;

        let iv_in = read_block(&buf[0..BLOCK_SIZE]);
        let iv_once = self.iv.encrypt_block(&iv_in);
        let iv_twice = self.iv.encrypt_block(&iv_once);

        let mut payload_out = vec![0u8; PAYLOAD_SIZE];
        aes::cbc_encrypt(&self.layer, &iv_once, &buf[BLOCK_SIZE..], &mut payload_out)?;

        buf[0..BLOCK_SIZE].copy_from_slice(&iv_twice);
        buf[BLOCK_SIZE..].copy_from_slice(&payload_out);
        Ok(())
    }
}

impl TunnelDecryption {
    /// Expand a 32-byte layer key and a 32-byte IV key.
    pub fn new(layer_key: &[u8; 32], iv_key: &[u8; 32]) -> Self {
        Self {
            layer: EcbDecryption::new(layer_key),
            iv: EcbDecryption::new(iv_key),
        }
    }

    /// Transform a 1024-byte (IV || payload) buffer in place into its
    /// decrypted form.
    pub fn decrypt(&self, buf: &mut [u8]) -> Result<()> {
        require_transform_size(buf)?;

        let iv_in = read_block(&buf[0..BLOCK_SIZE]);
        let iv_once = self.iv.decrypt_block(&iv_in);
        let iv_twice = self.iv.decrypt_block(&iv_once);

        let mut payload_out = vec![0u8; PAYLOAD_SIZE];
        aes::cbc_decrypt(&self.layer, &iv_once, &buf[BLOCK_SIZE..], &mut payload_out)?;

        buf[0..BLOCK_SIZE].copy_from_slice(&iv_twice);
        buf[BLOCK_SIZE..].copy_from_slice(&payload_out);
        Ok(())
    }
}

fn read_block(bytes: &[u8]) -> CipherBlock {
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(bytes);
    block
}

fn require_transform_size(buf: &[u8]) -> Result<()> {
    if buf.len() != TRANSFORM_SIZE {
        return Err(CryptoError::InvalidLength {
            expected: TRANSFORM_SIZE,
            actual: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_transform_buf() -> Vec<u8> {
        let mut buf = vec![0u8; TRANSFORM_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        buf
    }

    #[test]
    fn test_roundtrip() {
        let layer_key = [0x11u8; 32];
        let iv_key = [0x22u8; 32];
        let enc = TunnelEncryption::new(&layer_key, &iv_key);
        let dec = TunnelDecryption::new(&layer_key, &iv_key);

        let original = random_transform_buf();
        let mut buf = original.clone();
        enc.encrypt(&mut buf).expect("encrypt");
        assert_ne!(buf, original);

        dec.decrypt(&mut buf).expect("decrypt");
        assert_eq!(buf, original);
    }

    #[test]
    fn test_roundtrip_many_random_inputs() {
        let layer_key = [0x33u8; 32];
        let iv_key = [0x44u8; 32];
        let enc = TunnelEncryption::new(&layer_key, &iv_key);
        let dec = TunnelDecryption::new(&layer_key, &iv_key);

        for _ in 0..256 {
            let original = random_transform_buf();
            let mut buf = original.clone();
            enc.encrypt(&mut buf).expect("encrypt");
            dec.decrypt(&mut buf).expect("decrypt");
            assert_eq!(buf, original);
        }
    }

    #[test]
    fn test_double_iv_is_not_single_encrypt() {
        // IV' must be the IV encrypted twice, not once: verify by hand
        // against the raw ECB primitive.
        let layer_key = [0x55u8; 32];
        let iv_key = [0x66u8; 32];
        let enc = TunnelEncryption::new(&layer_key, &iv_key);

        let mut buf = random_transform_buf();
        let original_iv = read_block(&buf[0..BLOCK_SIZE]);
        enc.encrypt(&mut buf).expect("encrypt");
        let out_iv = read_block(&buf[0..BLOCK_SIZE]);

        let iv_ecb = aes::EcbEncryption::new(&iv_key);
        let once = iv_ecb.encrypt_block(&original_iv);
        let twice = iv_ecb.encrypt_block(&once);
        assert_ne!(out_iv, once, "output IV must not be the single-ECB pass");
        assert_eq!(out_iv, twice);
    }

    #[test]
    fn test_rejects_wrong_size() {
        let enc = TunnelEncryption::new(&[0u8; 32], &[0u8; 32]);
        let mut buf = vec![0u8; 100];
        assert!(enc.encrypt(&mut buf).is_err());
    }

    #[test]
    fn test_different_keys_different_ciphertext() {
        let original = random_transform_buf();

        let enc1 = TunnelEncryption::new(&[1u8; 32], &[2u8; 32]);
        let mut buf1 = original.clone();
        enc1.encrypt(&mut buf1).expect("encrypt");

        let enc2 = TunnelEncryption::new(&[3u8; 32], &[4u8; 32]);
        let mut buf2 = original;
        enc2.encrypt(&mut buf2).expect("encrypt");

        assert_ne!(buf1, buf2);
    }
}

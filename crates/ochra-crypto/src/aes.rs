//! AES-256 ECB block operation (FIPS 197).
//!
//! This is the leaf primitive every tunnel-crypto construction rests on:
//! a single 16-byte block encrypt/decrypt, nothing more. Built on the
//! `aes` crate, which picks an AES-NI-accelerated backend when the host
//! supports it and a constant-time portable backend otherwise; both are
//! required by that crate to be byte-exact, so this module never has to
//! choose between the two paths itself.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;

use crate::{CryptoError, Result};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a single AES block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// An opaque 16-byte cipher block.
///
/// Never logged, never compared except byte-for-byte.
pub type CipherBlock = [u8; BLOCK_SIZE];

/// An expanded AES-256 key schedule for ECB encryption.
#[derive(Clone)]
pub struct EcbEncryption {
    cipher: Aes256,
}

/// An expanded AES-256 key schedule for ECB decryption.
#[derive(Clone)]
pub struct EcbDecryption {
    cipher: Aes256,
}

impl EcbEncryption {
    /// Expand a 32-byte key into an encryption schedule.
    ///
    /// Infallible: any 32-byte value is a valid AES-256 key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256::new(key.into()),
        }
    }

    /// Encrypt a single 16-byte block.
    pub fn encrypt_block(&self, block: &CipherBlock) -> CipherBlock {
        let mut buf = *block;
        self.cipher.encrypt_block((&mut buf).into());
        buf
    }
}

impl EcbDecryption {
    /// Expand a 32-byte key into a decryption schedule.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256::new(key.into()),
        }
    }

    /// Decrypt a single 16-byte block.
    pub fn decrypt_block(&self, block: &CipherBlock) -> CipherBlock {
        let mut buf = *block;
        self.cipher.decrypt_block((&mut buf).into());
        buf
    }
}

/// Encrypt `in_buf` into `out_buf` using CBC chaining, starting from `iv`.
///
/// CBC is built directly on top of the ECB block operation rather than a
/// separate mode implementation, mirroring how the tunnel crypto layer
/// composes them. `in_buf.len()` must be a multiple of [`BLOCK_SIZE`];
/// `out_buf` must be at least as long.
pub fn cbc_encrypt(
    enc: &EcbEncryption,
    iv: &CipherBlock,
    in_buf: &[u8],
    out_buf: &mut [u8],
) -> Result<()> {
    require_block_aligned(in_buf, out_buf)?;
    let mut chain = *iv;
    for (chunk_in, chunk_out) in in_buf.chunks_exact(BLOCK_SIZE).zip(out_buf.chunks_exact_mut(BLOCK_SIZE)) {
        let mut block = [0u8; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            block[i] = chunk_in[i] ^ chain[i];
        }
        let ct = enc.encrypt_block(&block);
        chunk_out.copy_from_slice(&ct);
        chain = ct;
    }
    Ok(())
}

/// Decrypt `in_buf` into `out_buf` using CBC chaining, starting from `iv`.
pub fn cbc_decrypt(
    dec: &EcbDecryption,
    iv: &CipherBlock,
    in_buf: &[u8],
    out_buf: &mut [u8],
) -> Result<()> {
    require_block_aligned(in_buf, out_buf)?;
    let mut chain = *iv;
    for (chunk_in, chunk_out) in in_buf.chunks_exact(BLOCK_SIZE).zip(out_buf.chunks_exact_mut(BLOCK_SIZE)) {
        let mut ct_block = [0u8; BLOCK_SIZE];
        ct_block.copy_from_slice(chunk_in);
        let pt = dec.decrypt_block(&ct_block);
        for i in 0..BLOCK_SIZE {
            chunk_out[i] = pt[i] ^ chain[i];
        }
        chain = ct_block;
    }
    Ok(())
}

fn require_block_aligned(in_buf: &[u8], out_buf: &[u8]) -> Result<()> {
    if in_buf.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidLength {
            expected: BLOCK_SIZE,
            actual: in_buf.len(),
        });
    }
    if out_buf.len() < in_buf.len() {
        return Err(CryptoError::InvalidInput(format!(
            "output buffer too small: need {}, got {}",
            in_buf.len(),
            out_buf.len()
        )));
    }
    Ok(())
}

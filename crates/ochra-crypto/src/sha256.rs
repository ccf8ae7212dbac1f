//! SHA-256 hashing, used exclusively for the tunnel record checksum.
//!
//! The network-facing checksum is only the first 4 bytes of the digest;
//! [`checksum_prefix`] exposes that directly so callers never have to
//! remember to truncate.

use sha2::{Digest, Sha256};

/// Compute the full 32-byte SHA-256 digest of `data`.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the first 4 bytes of `SHA-256(data)`.
///
/// This is the exact quantity the tunnel record codec writes into the
/// checksum slot.
pub fn checksum_prefix(data: &[u8]) -> [u8; 4] {
    let full = digest(data);
    [full[0], full[1], full[2], full[3]]
}

/// Compute the checksum over two concatenated byte slices without an
/// intermediate allocation — `a` then `b`, in that order.
pub fn checksum_prefix_concat(a: &[u8], b: &[u8]) -> [u8; 4] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    let full: [u8; 32] = hasher.finalize().into();
    [full[0], full[1], full[2], full[3]]
}

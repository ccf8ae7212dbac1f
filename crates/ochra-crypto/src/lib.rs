//! # ochra-crypto
//!
//! Cryptographic primitives for the tunnel datapath.
//!
//! No algorithm negotiation is permitted — the cryptographic suite is
//! fixed: AES-256 for the tunnel datapath, Ed25519 for destination
//! signatures, SHA-256 for tunnel record checksums.
//!
//! ## Modules
//!
//! - [`aes`] — AES-256 ECB block operation and CBC mode built from it
//! - [`tunnel_crypto`] — the double-IV per-hop transformation layered
//!   over [`aes`]
//! - [`sha256`] — SHA-256, used only for the tunnel record checksum
//! - [`ed25519`] — Ed25519 signing and verification (RFC 8032), the
//!   datagram envelope's default destination signature algorithm

pub mod aes;
pub mod ed25519;
pub mod sha256;
pub mod tunnel_crypto;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// A buffer length was not a multiple of the AES block size, or was
    /// otherwise the wrong size for the requested operation.
    #[error("invalid length: expected multiple of {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

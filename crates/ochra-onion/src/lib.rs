//! # ochra-onion
//!
//! The I2P-style tunnel datapath: fixed-size tunnel records, the
//! fragmentation and reassembly that packs application messages into
//! them, the per-hop double-IV AES transform, and the transit role
//! machine that decides how a record is produced, transformed, and
//! delivered at each point on a tunnel.
//!
//! - [`record`] - the 1028-byte on-wire tunnel record codec
//! - [`fragment`] - first/follow-on fragment encode/decode, shared by
//!   [`gateway`] and [`reassembler`]
//! - [`gateway`] - packs inner messages into a tunnel's record stream
//! - [`reassembler`] - rebuilds inner messages from a tunnel's record
//!   stream
//! - [`transit`] - per-hop Participant/Gateway/Endpoint role machine
//! - [`datagram`] - signed application payloads carried over the plane
//! - [`dispatch`] - routes reassembled inner messages to their delivery
//!   target
//! - [`collab`] - collaborator traits for everything out of scope here
//!   (router identity, outbound tunnel selection, transport, garlic
//!   wrapping, the clock)

pub mod collab;
pub mod datagram;
pub mod dispatch;
pub mod fragment;
pub mod gateway;
pub mod reassembler;
pub mod record;
pub mod transit;

/// Maximum size of a ungzipped datagram payload this plane will accept.
pub const MAX_DATAGRAM_SIZE: usize = 32 * 1024;

/// Error taxonomy for the tunnel datapath.
///
/// All variants are non-fatal to the enclosing tunnel: the caller drops
/// the offending unit (record, fragment, datagram) and logs once via
/// `tracing`, at `warn` for protocol-level drops or `error` for
/// programming errors like [`OnionError::WrongRole`].
#[derive(Debug, thiserror::Error)]
pub enum OnionError {
    /// A tunnel record's checksum did not match its contents.
    #[error("bad checksum")]
    BadChecksum,

    /// No zero separator was found in a tunnel record's payload window.
    #[error("bad padding: no zero separator found")]
    BadPadding,

    /// A fragment was malformed or inconsistent with the stream it
    /// belongs to.
    #[error("bad fragment: {0}")]
    BadFragment(String),

    /// A datagram exceeded [`MAX_DATAGRAM_SIZE`] after decompression.
    #[error("oversize datagram: {size} bytes exceeds max {max}")]
    OversizeDatagram { size: usize, max: usize },

    /// A datagram's signature failed verification.
    #[error("signature invalid")]
    SignatureInvalid,

    /// No non-expired lease (and/or no outbound tunnel) was available.
    #[error("no route to destination")]
    NoRoute,

    /// A collaborator called an operation this role does not support.
    #[error("wrong role: expected {expected}, got {actual}")]
    WrongRole {
        expected: &'static str,
        actual: &'static str,
    },

    /// A buffer had the wrong length for the operation requested.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A cryptographic primitive failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] ochra_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, OnionError>;

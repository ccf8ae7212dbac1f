//! Router identity and signing-key-type metadata.
//!
//! Full identity/lease-set discovery lives outside this workspace (an
//! external collaborator); what stays here is just enough of the
//! identity shape for the datagram envelope to pick a pre-hash strategy
//! and for collaborator traits to name a destination.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// 32-byte SHA-256 of a router's identity, used throughout as an address.
pub type IdentHash = [u8; 32];

/// Which signature algorithm a destination's identity carries.
///
/// The workspace's own signer is always [`SigningKeyType::Ed25519`];
/// [`SigningKeyType::DsaSha1`] is preserved only so the envelope's
/// pre-hash branch (see [`crate`] docs) has something to match against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningKeyType {
    Ed25519,
    DsaSha1,
}

impl SigningKeyType {
    /// Whether a signature under this key type is computed over a
    /// SHA-256 pre-hash of the payload rather than the payload itself.
    ///
    /// DSA-SHA1 hashes its input with SHA-1 internally; this profile
    /// pre-hashes with SHA-256 first so the legacy algorithm never sees
    /// raw attacker-controlled bytes longer than a single hash block.
    pub fn pre_hashes_with_sha256(self) -> bool {
        matches!(self, SigningKeyType::DsaSha1)
    }
}

/// A router's public identity: its signing public key and the
/// algorithm it signs with.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterIdentity {
    #[serde_as(as = "serde_with::Bytes")]
    pub pubkey: [u8; 32],
    pub signing_key_type: SigningKeyType,
}

impl RouterIdentity {
    pub fn new(pubkey: [u8; 32], signing_key_type: SigningKeyType) -> Self {
        Self {
            pubkey,
            signing_key_type,
        }
    }
}

//! Collaborator interfaces.
//!
//! Everything this crate depends on but does not own — router identity,
//! outbound tunnel selection, transport I/O, garlic wrapping, and the
//! clock — is modeled as a trait here so the tunnel datapath never links
//! against a concrete router implementation.

use ochra_crypto::ed25519::Signature;
use ochra_types::{IdentHash, LeaseSet, RouterIdentity};

use crate::record::TUNNEL_DATA_MSG_SIZE;

/// Router-wide facts and capabilities the datapath needs but does not
/// own: its RNG, its local identity, and its signing key.
pub trait RouterContext: Send + Sync {
    fn local_identity(&self) -> RouterIdentity;
    fn sign(&self, buf: &[u8]) -> Signature;
}

/// Selects an outbound tunnel to carry a message leaving this router.
pub trait TunnelPool: Send + Sync {
    /// Returns the tunnel ID of a usable outbound tunnel, or `None` if
    /// none is currently available.
    fn next_outbound_tunnel(&self) -> Option<u32>;
}

/// Delivers finished tunnel records to the next hop.
pub trait Transport: Send + Sync {
    fn send_messages(&self, ident_hash: &IdentHash, records: &[[u8; TUNNEL_DATA_MSG_SIZE]]);
}

/// Wraps an inner message for garlic delivery to a remote destination.
pub trait GarlicWrapper: Send + Sync {
    fn wrap(&self, remote_lease_set: &LeaseSet, inner_msg: &[u8], ack: Option<&[u8]>) -> Vec<u8>;
}

/// A source of wall-clock time, abstracted so tests can control it.
pub trait Clock: Send + Sync {
    fn seconds_since_epoch(&self) -> u64;
}

/// A [`Clock`] backed by [`std::time::SystemTime`].
pub struct SystemClock;

impl Clock for SystemClock {
    fn seconds_since_epoch(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic_enough_for_ordering() {
        let clock = SystemClock;
        let t1 = clock.seconds_since_epoch();
        let t2 = clock.seconds_since_epoch();
        assert!(t2 >= t1);
    }
}

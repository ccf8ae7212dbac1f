//! Lease and lease-set shapes.
//!
//! Lease-set *discovery* — how a fresh lease set for a remote
//! destination is obtained and kept current — is an external
//! collaborator (see `ochra_onion::collab::TunnelPool` and friends).
//! What lives here is just the shape the Datagram Envelope reads to
//! pick a non-expired inbound gateway for a destination.

use serde::{Deserialize, Serialize};

use crate::identity::IdentHash;

/// A single inbound-tunnel advertisement: enter tunnel `tunnel_id` at
/// router `gateway`, good until `expires_at` (seconds since epoch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub gateway: IdentHash,
    pub tunnel_id: u32,
    pub expires_at: u64,
}

impl Lease {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// The leases currently advertised for one destination.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LeaseSet {
    pub leases: Vec<Lease>,
}

impl LeaseSet {
    /// Every lease still valid at `now`.
    pub fn non_expired(&self, now: u64) -> impl Iterator<Item = &Lease> {
        self.leases.iter().filter(move |l| !l.is_expired(now))
    }
}

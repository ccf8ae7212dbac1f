//! # ochra-types
//!
//! Wire-adjacent domain types shared across the tunnel datapath: router
//! identity, lease sets, and I2NP inner-message header framing.
//!
//! Discovery of identities and lease sets is an external collaborator
//! (see `ochra_onion::collab`); this crate only defines the shapes those
//! collaborators hand back across the boundary.

pub mod i2np;
pub mod identity;
pub mod lease;

pub use identity::{IdentHash, RouterIdentity, SigningKeyType};
pub use lease::{Lease, LeaseSet};

//! Transit Role Machine: per-hop state for a tunnel this router
//! participates in.
//!
//! A hop is instantiated as exactly one of [`Role::Participant`],
//! [`Role::Gateway`], or [`Role::Endpoint`] at construction and never
//! transitions. Calling an operation the current role does not support
//! is a non-fatal, logged [`OnionError::WrongRole`].

use ochra_crypto::tunnel_crypto::{TunnelDecryption, TunnelEncryption};
use ochra_types::IdentHash;
use tracing::error;

use crate::gateway::{GatewayBuffer, TunnelMessageBlock};
use crate::reassembler::{ReassembledMessage, Reassembler};
use crate::record::{self, TUNNEL_DATA_MSG_SIZE};
use crate::{OnionError, Result};

enum RoleState {
    Participant {
        batch: Vec<[u8; TUNNEL_DATA_MSG_SIZE]>,
    },
    Gateway {
        buffer: GatewayBuffer,
    },
    Endpoint {
        is_inbound: bool,
        reassembler: Reassembler,
    },
}

impl RoleState {
    fn name(&self) -> &'static str {
        match self {
            RoleState::Participant { .. } => "participant",
            RoleState::Gateway { .. } => "gateway",
            RoleState::Endpoint { .. } => "endpoint",
        }
    }
}

/// Per-hop state for one tunnel: receive ID, forwarding address,
/// expanded keys, and the role-specific behavior.
///
/// Ordered by creation time, tie-broken by receive tunnel ID: the
/// newest tunnel is greatest, so a plain (max-heap) `BinaryHeap`
/// pops newest-first, matching `TunnelCreationTimeCmp` from the
/// original, which ranks `t1` ahead of `t2` iff `t1` was created more
/// recently.
pub struct TransitTunnel {
    receive_tunnel_id: u32,
    next_tunnel_id: u32,
    next_ident_hash: IdentHash,
    encryption: TunnelEncryption,
    decryption: TunnelDecryption,
    transmitted_bytes: u64,
    created_at: u64,
    role: RoleState,
}

impl PartialEq for TransitTunnel {
    fn eq(&self, other: &Self) -> bool {
        self.created_at == other.created_at && self.receive_tunnel_id == other.receive_tunnel_id
    }
}

impl Eq for TransitTunnel {}

impl PartialOrd for TransitTunnel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransitTunnel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.receive_tunnel_id.cmp(&other.receive_tunnel_id))
    }
}

/// Construct a transit tunnel in the role implied by `(is_gateway,
/// is_endpoint)`. A transit endpoint is always outbound — it is never
/// this router's own inbound-tunnel terminus.
pub fn create_transit_tunnel(
    receive_tunnel_id: u32,
    next_ident_hash: IdentHash,
    next_tunnel_id: u32,
    layer_key: &[u8; 32],
    iv_key: &[u8; 32],
    is_gateway: bool,
    is_endpoint: bool,
    created_at: u64,
) -> TransitTunnel {
    let role = if is_endpoint {
        RoleState::Endpoint {
            is_inbound: false,
            reassembler: Reassembler::new(),
        }
    } else if is_gateway {
        RoleState::Gateway {
            buffer: GatewayBuffer::new(),
        }
    } else {
        RoleState::Participant { batch: Vec::new() }
    };

    TransitTunnel {
        receive_tunnel_id,
        next_tunnel_id,
        next_ident_hash,
        encryption: TunnelEncryption::new(layer_key, iv_key),
        decryption: TunnelDecryption::new(layer_key, iv_key),
        transmitted_bytes: 0,
        created_at,
        role,
    }
}

/// Construct an Endpoint hop directly, with an explicit inbound/outbound
/// marking.
///
/// `create_transit_tunnel` always produces an outbound endpoint, since a
/// transit endpoint (one this router did not itself request) is always
/// outbound. This constructor exists for the case where this router is
/// the actual creator and terminus of its own inbound tunnel.
pub fn create_endpoint(
    receive_tunnel_id: u32,
    next_ident_hash: IdentHash,
    next_tunnel_id: u32,
    layer_key: &[u8; 32],
    iv_key: &[u8; 32],
    is_inbound: bool,
    created_at: u64,
) -> TransitTunnel {
    TransitTunnel {
        receive_tunnel_id,
        next_tunnel_id,
        next_ident_hash,
        encryption: TunnelEncryption::new(layer_key, iv_key),
        decryption: TunnelDecryption::new(layer_key, iv_key),
        transmitted_bytes: 0,
        created_at,
        role: RoleState::Endpoint {
            is_inbound,
            reassembler: Reassembler::new(),
        },
    }
}

impl TransitTunnel {
    pub fn receive_tunnel_id(&self) -> u32 {
        self.receive_tunnel_id
    }

    pub fn num_transmitted_bytes(&self) -> u64 {
        self.transmitted_bytes
    }

    pub fn creation_time(&self) -> u64 {
        self.created_at
    }

    fn wrong_role(&self, expected: &'static str) -> OnionError {
        let err = OnionError::WrongRole {
            expected,
            actual: self.role.name(),
        };
        error!("{err}");
        err
    }

    /// Handle an inbound tunnel record: Participant forwards it
    /// onward; Endpoint recovers and reassembles its inner messages.
    /// Rejected for Gateway, which is never a record sink.
    pub fn handle_inbound(
        &mut self,
        mut record: [u8; TUNNEL_DATA_MSG_SIZE],
        now: u64,
    ) -> Result<Vec<ReassembledMessage>> {
        match &mut self.role {
            RoleState::Gateway { .. } => Err(self.wrong_role("participant or endpoint")),
            RoleState::Participant { batch } => {
                self.encryption.encrypt(&mut record[4..])?;
                record[0..4].copy_from_slice(&self.next_tunnel_id.to_be_bytes());
                self.transmitted_bytes += record.len() as u64;
                batch.push(record);
                Ok(Vec::new())
            }
            RoleState::Endpoint {
                is_inbound,
                reassembler,
            } => {
                if *is_inbound {
                    self.decryption.decrypt(&mut record[4..])?;
                } else {
                    self.encryption.encrypt(&mut record[4..])?;
                }
                let parsed = record::parse_record(&record)?;
                self.transmitted_bytes += record.len() as u64;
                Ok(reassembler.handle_fragments(&parsed.fragments, now))
            }
        }
    }

    /// Enqueue an inner message for a Gateway to pack into outbound
    /// records. Rejected for Participant and Endpoint.
    pub fn send_outbound(&mut self, block: TunnelMessageBlock) -> Result<()> {
        match &mut self.role {
            RoleState::Gateway { buffer } => {
                buffer.put(block);
                Ok(())
            }
            _ => Err(self.wrong_role("gateway")),
        }
    }

    /// Drain whatever this hop has accumulated (a Participant's
    /// forwarding batch, or a Gateway's packed records) for handoff to
    /// the transport layer. Rejected for Endpoint, which has nothing to
    /// forward.
    pub fn flush(&mut self) -> Result<(IdentHash, Vec<[u8; TUNNEL_DATA_MSG_SIZE]>)> {
        match &mut self.role {
            RoleState::Participant { batch } => Ok((self.next_ident_hash, std::mem::take(batch))),
            RoleState::Gateway { buffer } => {
                let mut records = buffer.send_buffer(self.next_tunnel_id)?;
                for record in &mut records {
                    self.encryption.encrypt(&mut record[4..])?;
                }
                self.transmitted_bytes += (records.len() * TUNNEL_DATA_MSG_SIZE) as u64;
                Ok((self.next_ident_hash, records))
            }
            RoleState::Endpoint { .. } => Err(self.wrong_role("participant or gateway")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::DeliveryInstructions;

    const LAYER_KEY: [u8; 32] = [0x11u8; 32];
    const IV_KEY: [u8; 32] = [0x22u8; 32];

    #[test]
    fn test_participant_forwards_and_rewrites_tunnel_id() {
        let mut tunnel = create_transit_tunnel(1, [0u8; 32], 99, &LAYER_KEY, &IV_KEY, false, false, 1000);

        let record = [0u8; TUNNEL_DATA_MSG_SIZE];
        tunnel.handle_inbound(record, 0).expect("handle_inbound");
        let (dest, batch) = tunnel.flush().expect("flush");
        assert_eq!(dest, [0u8; 32]);
        assert_eq!(batch.len(), 1);
        assert_eq!(u32::from_be_bytes(batch[0][0..4].try_into().unwrap()), 99);
    }

    #[test]
    fn test_participant_rejects_send_outbound() {
        let mut tunnel = create_transit_tunnel(1, [0u8; 32], 99, &LAYER_KEY, &IV_KEY, false, false, 0);
        let block = TunnelMessageBlock {
            instructions: DeliveryInstructions::Local,
            message_id: 1,
            data: vec![1, 2, 3],
        };
        assert!(matches!(
            tunnel.send_outbound(block),
            Err(OnionError::WrongRole { .. })
        ));
    }

    #[test]
    fn test_gateway_rejects_handle_inbound() {
        let mut tunnel = create_transit_tunnel(1, [0u8; 32], 99, &LAYER_KEY, &IV_KEY, true, false, 0);
        let record = [0u8; TUNNEL_DATA_MSG_SIZE];
        assert!(matches!(
            tunnel.handle_inbound(record, 0),
            Err(OnionError::WrongRole { .. })
        ));
    }

    #[test]
    fn test_gateway_packs_and_encrypts_on_flush() {
        let mut tunnel = create_transit_tunnel(1, [7u8; 32], 42, &LAYER_KEY, &IV_KEY, true, false, 0);
        tunnel
            .send_outbound(TunnelMessageBlock {
                instructions: DeliveryInstructions::Local,
                message_id: 1,
                data: b"hello".to_vec(),
            })
            .expect("send_outbound");

        let (dest, records) = tunnel.flush().expect("flush");
        assert_eq!(dest, [7u8; 32]);
        assert_eq!(records.len(), 1);
        assert_eq!(u32::from_be_bytes(records[0][0..4].try_into().unwrap()), 42);
    }

    #[test]
    fn test_inbound_endpoint_decrypts_its_own_gateway() {
        // A single-hop inbound tunnel where this router is both the
        // gateway and the endpoint: the endpoint's decrypt must invert
        // the gateway's encrypt exactly.
        let mut gateway = create_transit_tunnel(1, [0u8; 32], 2, &LAYER_KEY, &IV_KEY, true, false, 0);
        gateway
            .send_outbound(TunnelMessageBlock {
                instructions: DeliveryInstructions::Local,
                message_id: 5,
                data: b"endpoint test payload".to_vec(),
            })
            .expect("send_outbound");
        let (_, records) = gateway.flush().expect("flush");

        let mut endpoint = create_endpoint(2, [0u8; 32], 0, &LAYER_KEY, &IV_KEY, true, 0);
        let messages = endpoint.handle_inbound(records[0], 0).expect("handle_inbound");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, b"endpoint test payload");
    }

    #[test]
    fn test_outbound_transit_endpoint_is_always_outbound() {
        let tunnel = create_transit_tunnel(1, [0u8; 32], 0, &LAYER_KEY, &IV_KEY, false, true, 0);
        assert!(matches!(
            tunnel.role,
            RoleState::Endpoint { is_inbound: false, .. }
        ));
    }

    #[test]
    fn test_endpoint_rejects_flush() {
        let mut tunnel = create_transit_tunnel(1, [0u8; 32], 0, &LAYER_KEY, &IV_KEY, false, true, 0);
        assert!(matches!(tunnel.flush(), Err(OnionError::WrongRole { .. })));
    }

    #[test]
    fn test_ord_ranks_newest_creation_time_greatest() {
        let older = create_transit_tunnel(1, [0u8; 32], 0, &LAYER_KEY, &IV_KEY, false, false, 100);
        let newer = create_transit_tunnel(2, [0u8; 32], 0, &LAYER_KEY, &IV_KEY, false, false, 200);
        assert!(newer > older);
        assert!(older < newer);
    }

    #[test]
    fn test_ord_tie_breaks_on_receive_tunnel_id() {
        let a = create_transit_tunnel(5, [0u8; 32], 0, &LAYER_KEY, &IV_KEY, false, false, 100);
        let b = create_transit_tunnel(9, [0u8; 32], 0, &LAYER_KEY, &IV_KEY, false, false, 100);
        assert!(a < b);
    }

    #[test]
    fn test_creation_time_and_transmitted_bytes() {
        let mut tunnel = create_transit_tunnel(1, [0u8; 32], 99, &LAYER_KEY, &IV_KEY, false, false, 12345);
        assert_eq!(tunnel.creation_time(), 12345);
        assert_eq!(tunnel.num_transmitted_bytes(), 0);
        tunnel
            .handle_inbound([0u8; TUNNEL_DATA_MSG_SIZE], 0)
            .expect("handle_inbound");
        assert_eq!(tunnel.num_transmitted_bytes(), TUNNEL_DATA_MSG_SIZE as u64);
    }
}

//! Delivery Dispatcher: routes a reassembled inner message to its
//! delivery target.
//!
//! An Endpoint's [`crate::reassembler::Reassembler`] hands finished
//! messages here tagged with the [`DeliveryInstructions`] they carried.
//! `Local` messages go to this router's own message handling; `Tunnel`
//! and `Router` messages are repacked through a fresh
//! [`GatewayBuffer`](crate::gateway::GatewayBuffer) and handed to the
//! [`Transport`] collaborator, mirroring how a transit gateway would
//! have produced them in the first place.

use crate::collab::Transport;
use crate::fragment::DeliveryInstructions;
use crate::gateway::{GatewayBuffer, TunnelMessageBlock};
use crate::reassembler::ReassembledMessage;
use crate::Result;

/// Where a dispatched message ended up.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// Delivered to this router's own local handling.
    Local,
    /// Repacked and handed to the transport for a remote router or
    /// tunnel gateway.
    Forwarded,
}

/// Routes reassembled inner messages to their delivery target.
pub struct Dispatcher<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Dispatcher<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Dispatch one reassembled message. `local` receives the raw
    /// payload for [`DeliveryInstructions::Local`] messages; it is not
    /// called otherwise.
    pub fn dispatch(&self, message: ReassembledMessage, local: impl FnOnce(Vec<u8>)) -> Result<Dispatched> {
        match message.instructions {
            DeliveryInstructions::Local => {
                local(message.data);
                Ok(Dispatched::Local)
            }
            DeliveryInstructions::Router { hash } => {
                let records = repack_for_forwarding(0, message.data)?;
                self.transport.send_messages(&hash, &records);
                Ok(Dispatched::Forwarded)
            }
            DeliveryInstructions::Tunnel { hash, tunnel_id } => {
                let records = repack_for_forwarding(tunnel_id, message.data)?;
                self.transport.send_messages(&hash, &records);
                Ok(Dispatched::Forwarded)
            }
        }
    }
}

fn repack_for_forwarding(
    tunnel_id: u32,
    data: Vec<u8>,
) -> Result<Vec<[u8; crate::record::TUNNEL_DATA_MSG_SIZE]>> {
    let mut buffer = GatewayBuffer::new();
    buffer.put(TunnelMessageBlock {
        instructions: DeliveryInstructions::Local,
        message_id: 0,
        data,
    });
    buffer.send_buffer(tunnel_id)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Mutex;

    use super::*;
    use crate::record::TUNNEL_DATA_MSG_SIZE;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ochra_types::IdentHash, usize)>>,
    }

    impl Transport for RecordingTransport {
        fn send_messages(&self, ident_hash: &ochra_types::IdentHash, records: &[[u8; TUNNEL_DATA_MSG_SIZE]]) {
            self.sent.lock().unwrap().push((*ident_hash, records.len()));
        }
    }

    #[test]
    fn test_local_message_invokes_callback_not_transport() {
        let transport = RecordingTransport::default();
        let dispatcher = Dispatcher::new(&transport);
        let received = RefCell::new(None);

        let message = ReassembledMessage {
            instructions: DeliveryInstructions::Local,
            data: b"hello".to_vec(),
        };
        let outcome = dispatcher
            .dispatch(message, |data| *received.borrow_mut() = Some(data))
            .expect("dispatch");

        assert_eq!(outcome, Dispatched::Local);
        assert_eq!(received.into_inner(), Some(b"hello".to_vec()));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_router_message_forwarded_via_transport() {
        let transport = RecordingTransport::default();
        let dispatcher = Dispatcher::new(&transport);

        let message = ReassembledMessage {
            instructions: DeliveryInstructions::Router { hash: [3u8; 32] },
            data: b"router-bound".to_vec(),
        };
        let outcome = dispatcher.dispatch(message, |_| panic!("local must not run")).expect("dispatch");

        assert_eq!(outcome, Dispatched::Forwarded);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, [3u8; 32]);
        assert_eq!(sent[0].1, 1);
    }

    #[test]
    fn test_tunnel_message_forwarded_via_transport() {
        let transport = RecordingTransport::default();
        let dispatcher = Dispatcher::new(&transport);

        let message = ReassembledMessage {
            instructions: DeliveryInstructions::Tunnel {
                hash: [4u8; 32],
                tunnel_id: 77,
            },
            data: b"tunnel-bound".to_vec(),
        };
        let outcome = dispatcher.dispatch(message, |_| panic!("local must not run")).expect("dispatch");

        assert_eq!(outcome, Dispatched::Forwarded);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, [4u8; 32]);
    }
}

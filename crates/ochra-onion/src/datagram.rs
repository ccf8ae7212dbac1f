//! Datagram Envelope: signed application payloads carried over the
//! tunnel plane.
//!
//! A datagram is `signing_key_type (1B) || sender pubkey (32B) ||
//! signature (64B) || payload`, gzip-compressed, and wrapped as a Data
//! message body (`length (4B BE) || gzip body || 8 zero bytes ||
//! protocol-type byte`). That body is itself carried as the payload of
//! an I2NP message (`ochra_types::i2np::I2npHeader`, type `Data`)
//! before being handed to a
//! [`GatewayBuffer`](crate::gateway::GatewayBuffer).
//!
//! Legacy [`SigningKeyType::DsaSha1`] destinations sign a SHA-256
//! pre-hash of the payload rather than the payload itself, a quirk
//! carried forward from the original DSA-SHA1 profile's 20-byte digest
//! limit. This plane only ever mints [`SigningKeyType::Ed25519`] keys
//! itself — the legacy variant exists so a destination claiming it is
//! handled with the right pre-hash, not because this router can create
//! one.

use std::io::{Read, Write};
use std::sync::Mutex;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::seq::IteratorRandom;
use rand::RngCore;
use tracing::warn;

use ochra_crypto::ed25519::{KeyPair, Signature, VerifyingKey};
use ochra_crypto::sha256;
use ochra_types::i2np::{I2npHeader, MessageType, HEADER_SIZE};
use ochra_types::{IdentHash, LeaseSet, RouterIdentity, SigningKeyType};

use crate::collab::GarlicWrapper;
use crate::fragment::DeliveryInstructions;
use crate::gateway::TunnelMessageBlock;
use crate::record::TUNNEL_DATA_MSG_SIZE;
use crate::transit::TransitTunnel;
use crate::{OnionError, Result, MAX_DATAGRAM_SIZE};

const SENDER_PUBKEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;
const ENVELOPE_HEADER_LEN: usize = 1 + SENDER_PUBKEY_LEN + SIGNATURE_LEN;

/// I2NP protocol-type byte for a raw (non-streaming) datagram, matching
/// the original's `PROTOCOL_TYPE_DATAGRAM`.
const DATAGRAM_PROTOCOL: u8 = 17;
const DATA_MESSAGE_TRAILER_LEN: usize = 8;

fn signing_key_type_to_byte(t: SigningKeyType) -> u8 {
    match t {
        SigningKeyType::Ed25519 => 0,
        SigningKeyType::DsaSha1 => 1,
    }
}

fn signing_key_type_from_byte(b: u8) -> Result<SigningKeyType> {
    match b {
        0 => Ok(SigningKeyType::Ed25519),
        1 => Ok(SigningKeyType::DsaSha1),
        other => Err(OnionError::BadFragment(format!("unknown signing key type byte {other}"))),
    }
}

type Receiver = dyn Fn(RouterIdentity, Vec<u8>) + Send + Sync;

/// A local destination that can sign and frame outbound datagrams, and
/// dispatch verified inbound ones to a registered receiver.
pub struct DatagramDestination {
    identity: RouterIdentity,
    keypair: KeyPair,
    receiver: Mutex<Option<Box<Receiver>>>,
}

impl DatagramDestination {
    pub fn new(keypair: KeyPair, signing_key_type: SigningKeyType) -> Self {
        let identity = RouterIdentity::new(keypair.verifying_key.to_bytes(), signing_key_type);
        Self {
            identity,
            keypair,
            receiver: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &RouterIdentity {
        &self.identity
    }

    /// Register the callback invoked with `(identity, payload)` for
    /// each inbound datagram that verifies successfully. Replaces any
    /// previously registered receiver.
    pub fn set_receiver<F>(&self, receiver: F)
    where
        F: Fn(RouterIdentity, Vec<u8>) + Send + Sync + 'static,
    {
        *self.receiver.lock().expect("receiver mutex poisoned") = Some(Box::new(receiver));
    }

    /// Verify and unwrap an inbound I2NP message (already reassembled
    /// from its tunnel/fragment framing) and hand `(identity, payload)`
    /// to the registered receiver.
    ///
    /// A missing receiver, invalid gzip, oversized ungzipped payload, or
    /// signature failure each drop the datagram with a `warn`-level log
    /// rather than propagating an error — there is no caller here to
    /// hand a `Result` back to once a message has reached the inbound
    /// plane.
    pub fn handle_inbound(&self, data_message: &[u8]) {
        let (identity, payload) = match handle_data_message_payload(data_message) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "dropping inbound datagram");
                return;
            }
        };

        let guard = self.receiver.lock().expect("receiver mutex poisoned");
        match guard.as_ref() {
            Some(receiver) => receiver(identity, payload),
            None => warn!("dropping inbound datagram: no receiver registered"),
        }
    }

    /// Sign, envelope, compress, and frame `payload`, returning a
    /// complete I2NP message (header plus Data message body) ready to
    /// become a
    /// [`TunnelMessageBlock`](crate::gateway::TunnelMessageBlock)'s data.
    ///
    /// This is the framing half of [`Self::send_to`] alone, exposed
    /// separately for callers (tests, the loopback demo) that just want
    /// the wire bytes without driving the full outbound pipeline.
    pub fn frame(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(OnionError::OversizeDatagram {
                size: payload.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        let signature = self.sign(payload);

        let mut envelope = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
        envelope.push(signing_key_type_to_byte(self.identity.signing_key_type));
        envelope.extend_from_slice(&self.identity.pubkey);
        envelope.extend_from_slice(&signature.to_bytes());
        envelope.extend_from_slice(payload);

        let compressed = gzip_compress(&envelope);
        let body = encode_data_message(&compressed);
        Ok(wrap_i2np_message(MessageType::Data, &body))
    }

    /// The full outbound pipeline: frame `payload`, pick a non-expired
    /// lease from `lease_set` uniformly at random, garlic-wrap it, and
    /// hand the wrapped message to `outbound_gateway`'s Gateway role
    /// addressed to that lease, returning the packed records ready for
    /// the transport layer.
    ///
    /// `outbound_gateway` is the local outbound tunnel already selected
    /// by the `TunnelPool` collaborator (tunnel selection itself is out
    /// of scope here); `None` means none was available. Fails with
    /// [`OnionError::NoRoute`] if `lease_set` has no non-expired lease,
    /// or no outbound tunnel was supplied — either way the framed inner
    /// message is simply dropped, never retried from here.
    pub fn send_to(
        &self,
        payload: &[u8],
        lease_set: &LeaseSet,
        now: u64,
        garlic: &dyn GarlicWrapper,
        outbound_gateway: Option<&mut TransitTunnel>,
    ) -> Result<(IdentHash, Vec<[u8; TUNNEL_DATA_MSG_SIZE]>)> {
        let lease = lease_set
            .non_expired(now)
            .choose(&mut rand::rngs::OsRng)
            .copied()
            .ok_or(OnionError::NoRoute)?;
        let outbound_gateway = outbound_gateway.ok_or(OnionError::NoRoute)?;

        let inner = self.frame(payload)?;
        let wrapped = garlic.wrap(lease_set, &inner, None);

        outbound_gateway.send_outbound(TunnelMessageBlock {
            instructions: DeliveryInstructions::Tunnel {
                hash: lease.gateway,
                tunnel_id: lease.tunnel_id,
            },
            message_id: rand::rngs::OsRng.next_u32(),
            data: wrapped,
        })?;
        outbound_gateway.flush()
    }

    fn sign(&self, payload: &[u8]) -> Signature {
        if self.identity.signing_key_type.pre_hashes_with_sha256() {
            self.keypair.signing_key.sign(&sha256::digest(payload))
        } else {
            self.keypair.signing_key.sign(payload)
        }
    }
}

/// Verify and unwrap an inbound I2NP message carrying a Data message
/// body (already reassembled from its tunnel/fragment framing),
/// returning the sender's identity and the original payload.
///
/// Fails with [`OnionError::SignatureInvalid`] if the embedded signature
/// does not verify, or [`OnionError::OversizeDatagram`] if the
/// decompressed payload exceeds [`MAX_DATAGRAM_SIZE`].
pub fn handle_data_message_payload(data_message: &[u8]) -> Result<(RouterIdentity, Vec<u8>)> {
    let body = unwrap_i2np_message(data_message)?;
    let compressed = decode_data_message(body)?;
    let envelope = gzip_decompress(compressed)?;

    if envelope.len() < ENVELOPE_HEADER_LEN {
        return Err(OnionError::BadFragment("datagram envelope truncated".into()));
    }

    let signing_key_type = signing_key_type_from_byte(envelope[0])?;
    let pubkey: [u8; SENDER_PUBKEY_LEN] = envelope[1..1 + SENDER_PUBKEY_LEN]
        .try_into()
        .expect("slice is exactly SENDER_PUBKEY_LEN bytes");
    let sig_start = 1 + SENDER_PUBKEY_LEN;
    let sig_bytes: [u8; SIGNATURE_LEN] = envelope[sig_start..sig_start + SIGNATURE_LEN]
        .try_into()
        .expect("slice is exactly SIGNATURE_LEN bytes");
    let payload = envelope[sig_start + SIGNATURE_LEN..].to_vec();

    if payload.len() > MAX_DATAGRAM_SIZE {
        return Err(OnionError::OversizeDatagram {
            size: payload.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }

    let verifying_key = VerifyingKey::from_bytes(&pubkey).map_err(|_| OnionError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&sig_bytes);

    let verified = if signing_key_type.pre_hashes_with_sha256() {
        verifying_key.verify(&sha256::digest(&payload), &signature)
    } else {
        verifying_key.verify(&payload, &signature)
    };
    verified.map_err(|_| OnionError::SignatureInvalid)?;

    Ok((RouterIdentity::new(pubkey, signing_key_type), payload))
}

/// Prepend a 16-byte I2NP header to `body`, the way every inner message
/// (not just datagrams) is framed for delivery through a tunnel.
fn wrap_i2np_message(message_type: MessageType, body: &[u8]) -> Vec<u8> {
    let header = I2npHeader {
        message_type,
        message_id: rand::rngs::OsRng.next_u32(),
        expiration: 0,
        length: body.len() as u16,
        checksum: sha256::checksum_prefix(body)[0],
    };
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(body);
    out
}

/// Strip and validate the I2NP header this module's `frame` prepends,
/// returning the Data message body that follows it.
fn unwrap_i2np_message(data_message: &[u8]) -> Result<&[u8]> {
    let header = I2npHeader::decode(data_message)
        .ok_or_else(|| OnionError::BadFragment("I2NP header truncated".into()))?;
    if header.message_type != MessageType::Data {
        return Err(OnionError::BadFragment(format!(
            "expected I2NP Data message, got {:?}",
            header.message_type
        )));
    }
    data_message
        .get(HEADER_SIZE..HEADER_SIZE + header.length as usize)
        .ok_or_else(|| OnionError::BadFragment("I2NP header length exceeds buffer".into()))
}

fn encode_data_message(compressed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + compressed.len() + DATA_MESSAGE_TRAILER_LEN + 1);
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(compressed);
    out.extend_from_slice(&[0u8; DATA_MESSAGE_TRAILER_LEN]);
    out.push(DATAGRAM_PROTOCOL);
    out
}

fn decode_data_message(data_message: &[u8]) -> Result<&[u8]> {
    if data_message.len() < 4 {
        return Err(OnionError::BadFragment("data message shorter than its length prefix".into()));
    }
    let len = u32::from_be_bytes(
        data_message[0..4]
            .try_into()
            .expect("slice is exactly 4 bytes"),
    ) as usize;
    data_message
        .get(4..4 + len)
        .ok_or_else(|| OnionError::BadFragment("data message length prefix exceeds buffer".into()))
}

fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to an in-memory Vec never fails");
    encoder.finish().expect("finishing an in-memory gzip stream never fails")
}

fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| OnionError::BadFragment(format!("gzip decompress failed: {e}")))?;
    Ok(out)
}

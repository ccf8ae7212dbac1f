//! ochra-router: a minimal host process for the tunnel datapath.
//!
//! Wires together logging, configuration, and the `ochra-onion` crate.
//! Transport, tunnel selection, and lease-set discovery are external
//! collaborators (see `ochra_onion::collab`) with no concrete
//! implementation here; this binary demonstrates the local,
//! network-free half of the datapath: building a transit tunnel,
//! signing and framing a datagram, and carrying it end to end through
//! the tunnel record codec.

mod config;

use ochra_crypto::ed25519::KeyPair;
use ochra_onion::datagram::{self, DatagramDestination};
use ochra_onion::gateway::TunnelMessageBlock;
use ochra_onion::record::TUNNEL_DATA_MSG_SIZE;
use ochra_onion::transit::{create_endpoint, create_transit_tunnel};
use ochra_onion::fragment::DeliveryInstructions;
use ochra_types::SigningKeyType;
use tracing::info;

use crate::config::RouterConfig;

fn main() -> anyhow::Result<()> {
    let config = RouterConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.advanced.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("ochra-router starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    info!(slot_expiry_secs = config.tunnel.slot_expiry_secs, "tunnel datapath configured");

    demonstrate_local_loopback()?;

    info!("ochra-router exiting");
    Ok(())
}

/// Build a single-hop inbound tunnel whose gateway and endpoint are
/// both this router, sign and frame a datagram through
/// [`DatagramDestination`], and carry it end to end through the
/// tunnel record codec to confirm the wiring holds together.
fn demonstrate_local_loopback() -> anyhow::Result<()> {
    let layer_key = [0x11u8; 32];
    let iv_key = [0x22u8; 32];

    let destination = DatagramDestination::new(KeyPair::generate(), SigningKeyType::Ed25519);
    let framed = destination.frame(b"hello from ochra-router")?;

    let mut gateway = create_transit_tunnel(1, [0u8; 32], 2, &layer_key, &iv_key, true, false, 0);
    gateway.send_outbound(TunnelMessageBlock {
        instructions: DeliveryInstructions::Local,
        message_id: 1,
        data: framed,
    })?;
    let (_, records) = gateway.flush()?;
    info!(records = records.len(), "gateway packed outbound tunnel records");

    let mut endpoint = create_endpoint(2, [0u8; 32], 0, &layer_key, &iv_key, true, 0);
    let mut messages = Vec::new();
    let mut record_buf = [0u8; TUNNEL_DATA_MSG_SIZE];
    for record in records {
        record_buf.copy_from_slice(&record);
        messages.extend(endpoint.handle_inbound(record_buf, 0)?);
    }

    for message in messages {
        let (identity, payload) = datagram::handle_data_message_payload(&message.data)?;
        info!(
            sender = %hex::encode(identity.pubkey),
            payload = %String::from_utf8_lossy(&payload),
            "endpoint recovered datagram"
        );
    }
    Ok(())
}

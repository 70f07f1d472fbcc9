//! Demonstration binary: brings up two nodes on an in-memory loopback
//! transport, resolves each other's key by address, and exchanges one
//! datagram — exercising the same path a real tunnel driver would.
//!
//! Startup loads `.env` via `dotenvy`, installs a `tracing-subscriber`
//! filter, then constructs the long-lived pieces and runs them under a
//! `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use overlay_keystore::config::CliArgs;
use overlay_keystore::identity::Identity;
use overlay_keystore::mock::MockNetwork;
use overlay_keystore::node::{DiscardProtocolHandler, Node};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli_args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli_args.log_filter.clone()))
        .init();

    let seed_a = cli_args.identity_seed()?;
    let identity_a = match seed_a {
        Some(seed) => Identity::from_seed(seed),
        None => Identity::generate(),
    };
    let identity_b = Identity::generate();

    let network = MockNetwork::new();
    let transport_a = Arc::new(network.join(identity_a.public_key(), cli_args.mtu));
    let transport_b = Arc::new(network.join(identity_b.public_key(), cli_args.mtu));

    let (node_a, lookup_rx_a) = Node::new(identity_a, transport_a, Arc::new(DiscardProtocolHandler), cli_args.mtu);
    let (node_b, lookup_rx_b) = Node::new(identity_b, transport_b, Arc::new(DiscardProtocolHandler), cli_args.mtu);

    info!(address = %node_a.address(), "node A up");
    info!(address = %node_b.address(), "node B up");

    let shutdown = CancellationToken::new();
    tokio::spawn(Arc::clone(&node_a).run_resolution(lookup_rx_a, shutdown.clone()));
    tokio::spawn(Arc::clone(&node_b).run_resolution(lookup_rx_b, shutdown.clone()));
    tokio::spawn(Arc::clone(&node_a).run_expiry_sweep(Duration::from_secs(30), shutdown.clone()));
    tokio::spawn(Arc::clone(&node_b).run_expiry_sweep(Duration::from_secs(30), shutdown.clone()));

    let mut frame = vec![0u8; 48];
    frame[0] = 0x60;
    frame[8..24].copy_from_slice(&node_a.address().to_ipv6().octets());
    frame[24..40].copy_from_slice(&node_b.address().to_ipv6().octets());

    node_a.write_packet(&frame).await?;
    info!("node A sent a datagram toward node B, resolving in the background");

    let mut out_buf = Vec::new();
    tokio::select! {
        result = node_b.read_packet(&mut out_buf) => {
            result?;
            info!(bytes = out_buf.len(), "node B received the datagram");
        }
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            info!("timed out waiting for delivery");
        }
    }

    shutdown.cancel();
    Ok(())
}

//! Wires identity, key store, resolution handler, and packet path into a
//! single entry point (spec.md §2's "leaves first" component list,
//! assembled). Nothing here is itself a spec.md component — it is the glue
//! a tunnel driver holds onto: a small owning struct built once from config,
//! exposing the operations the rest of the program drives.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::address::{Address, PartialKeyHint, Subnet};
use crate::error::{PacketError, TransportError};
use crate::identity::{Identity, PublicKey};
use crate::keystore::KeyStore;
use crate::packet;
use crate::resolution::ResolutionHandler;
use crate::transport::{ProtocolHandler, Transport};

/// A no-op [`ProtocolHandler`] for demonstrations and tests that don't
/// exercise session-proto traffic.
pub struct DiscardProtocolHandler;

#[async_trait::async_trait]
impl ProtocolHandler for DiscardProtocolHandler {
    async fn handle(&self, _from: PublicKey, _payload: Vec<u8>) {}
}

/// A complete node: an identity, its key store, and the resolution handler
/// that keeps the store fed.
pub struct Node {
    identity: Arc<Identity>,
    keystore: Arc<KeyStore>,
    resolution: Arc<ResolutionHandler>,
    transport: Arc<dyn Transport>,
    protocol: Arc<dyn ProtocolHandler>,
}

impl Node {
    /// Builds a node from an identity and a transport. `protocol` receives
    /// session-proto traffic demultiplexed out of the ingress path; pass
    /// [`DiscardProtocolHandler`] if the caller doesn't use that channel.
    pub fn new(identity: Identity, transport: Arc<dyn Transport>, protocol: Arc<dyn ProtocolHandler>, mtu: u16) -> (Arc<Self>, mpsc::UnboundedReceiver<PartialKeyHint>) {
        let identity = Arc::new(identity);
        let (lookup_tx, lookup_rx) = mpsc::unbounded_channel();
        let keystore = Arc::new(KeyStore::new(
            identity.public_key(),
            Arc::clone(&transport),
            lookup_tx,
            mtu,
        ));
        let resolution = Arc::new(ResolutionHandler::new(
            Arc::clone(&identity),
            Arc::clone(&transport),
            Arc::clone(&keystore),
        ));
        let node = Arc::new(Self {
            identity,
            keystore,
            resolution,
            transport,
            protocol,
        });
        (node, lookup_rx)
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn address(&self) -> Address {
        self.keystore.self_address()
    }

    pub fn subnet(&self) -> Subnet {
        self.keystore.self_subnet()
    }

    pub async fn mtu(&self) -> u16 {
        self.keystore.mtu().await
    }

    pub async fn set_mtu(&self, mtu: u16) {
        self.keystore.set_mtu(mtu).await;
    }

    /// The payload budget a tunnel driver should advertise upstream: the
    /// transport MTU less the one-byte session tag every outbound frame
    /// carries (mirrors the original's `maxSessionMTU`).
    pub async fn max_session_mtu(&self) -> u16 {
        self.keystore.mtu().await - 1
    }

    /// Evicts expired key-store entries and pending buffers immediately,
    /// rather than waiting for [`Self::run_expiry_sweep`]'s next tick.
    pub async fn sweep_expired(&self) {
        self.keystore.sweep_expired().await;
    }

    /// Egress entry point: validates and dispatches an outbound IPv6 frame.
    pub async fn write_packet(&self, frame: &[u8]) -> Result<usize, PacketError> {
        packet::write_packet(&self.keystore, frame).await
    }

    /// Ingress entry point: blocks until a deliverable IPv6 frame is ready.
    pub async fn read_packet(&self, out_buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        packet::read_packet(&self.keystore, self.transport.as_ref(), self.protocol.as_ref(), out_buf).await
    }

    /// Runs the resolution protocol's two independent tasks — the lookup
    /// dispatcher (fed by key-store misses) and the inbound OOB handler —
    /// until `shutdown` fires or the transport errors out. Intended to be
    /// spawned alongside the caller's own ingress loop (spec.md §5).
    pub async fn run_resolution(
        self: Arc<Self>,
        lookup_rx: mpsc::UnboundedReceiver<PartialKeyHint>,
        shutdown: CancellationToken,
    ) {
        let lookup_task = {
            let resolution = Arc::clone(&self.resolution);
            tokio::spawn(async move { resolution.run_lookup_loop(lookup_rx).await })
        };
        let oob_task = {
            let resolution = Arc::clone(&self.resolution);
            tokio::spawn(async move { resolution.run_oob_loop().await })
        };

        shutdown.cancelled().await;
        lookup_task.abort();
        oob_task.abort();
        info!("resolution tasks stopped");
    }

    /// Periodically reclaims expired key-store entries and pending buffers;
    /// the lazy per-access eviction already enforces `T_keep` for anything
    /// actually queried (spec.md §9's "sweep lazily on access" option), this
    /// just bounds memory for destinations nobody touches again.
    pub async fn run_expiry_sweep(self: Arc<Self>, period: std::time::Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.keystore.sweep_expired().await,
                _ = shutdown.cancelled() => return,
            }
        }
    }
}

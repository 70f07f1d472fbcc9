//! An in-memory stand-in for the real packet-conn transport.
//!
//! Nothing here is part of the contract spec.md leaves out of scope — it is
//! a reference implementation of [`crate::transport::Transport`] good enough
//! to drive this crate's own tests and the demonstration binary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};

use crate::error::TransportError;
use crate::identity::PublicKey;
use crate::transport::{OobMessage, OobTarget, Transport};

type SessionMsg = (PublicKey, Vec<u8>);
type OobMsg = (PublicKey, [u8; 32], OobMessage);

struct NodeChannels {
    session_tx: mpsc::UnboundedSender<SessionMsg>,
    oob_tx: mpsc::UnboundedSender<OobMsg>,
}

/// A shared switchboard that a handful of [`MockTransport`]s register with.
/// Session frames are delivered to exactly the named recipient; out-of-band
/// messages addressed by [`OobTarget::Partial`] are broadcast to every other
/// registered node, approximating the prefix-routed delivery a real
/// transport would perform (spec.md §4.4) without implementing key-space
/// routing.
#[derive(Default)]
pub struct MockNetwork {
    nodes: StdMutex<HashMap<PublicKey, NodeChannels>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new node and returns its [`Transport`] handle.
    pub fn join(self: &Arc<Self>, key: PublicKey, mtu: u16) -> MockTransport {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (oob_tx, oob_rx) = mpsc::unbounded_channel();
        self.nodes
            .lock()
            .expect("mock network lock poisoned")
            .insert(key, NodeChannels { session_tx, oob_tx });
        MockTransport {
            network: Arc::clone(self),
            self_key: key,
            mtu,
            session_rx: Mutex::new(session_rx),
            oob_rx: Mutex::new(oob_rx),
        }
    }
}

pub struct MockTransport {
    network: Arc<MockNetwork>,
    self_key: PublicKey,
    mtu: u16,
    session_rx: Mutex<mpsc::UnboundedReceiver<SessionMsg>>,
    oob_rx: Mutex<mpsc::UnboundedReceiver<OobMsg>>,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn mtu(&self) -> u16 {
        self.mtu
    }

    async fn send(&self, to: PublicKey, frame: Vec<u8>) -> Result<(), TransportError> {
        let nodes = self.network.nodes.lock().expect("mock network lock poisoned");
        match nodes.get(&to) {
            Some(channels) => {
                let _ = channels.session_tx.send((self.self_key, frame));
                Ok(())
            }
            None => Err(TransportError::new(format!("no such mock peer: {to}"))),
        }
    }

    async fn recv(&self) -> Result<(PublicKey, Vec<u8>), TransportError> {
        self.session_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| TransportError::new("mock session channel closed"))
    }

    async fn send_oob(&self, target: OobTarget, message: OobMessage) -> Result<(), TransportError> {
        let to_bytes = target.as_bytes();
        let nodes = self.network.nodes.lock().expect("mock network lock poisoned");
        match target {
            OobTarget::Key(key) => {
                if let Some(channels) = nodes.get(&key) {
                    let _ = channels.oob_tx.send((self.self_key, to_bytes, message));
                }
            }
            OobTarget::Partial(_) => {
                for (key, channels) in nodes.iter() {
                    if *key == self.self_key {
                        continue;
                    }
                    let _ = channels.oob_tx.send((self.self_key, to_bytes, message));
                }
            }
        }
        Ok(())
    }

    async fn recv_oob(&self) -> Result<(PublicKey, [u8; 32], OobMessage), TransportError> {
        self.oob_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| TransportError::new("mock oob channel closed"))
    }
}

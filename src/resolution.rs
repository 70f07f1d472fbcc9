//! Out-of-band key resolution: the signed LOOKUP/RESPONSE handshake that
//! turns a destination address or subnet into a [`KeyStore`] entry
//! (spec.md §4.4).
//!
//! Wire messages are exactly `1 + 64` bytes (a tag plus an Ed25519
//! signature) — there is no room to also carry the 32-byte target the
//! signature was computed over, so [`crate::transport::Transport::recv_oob`]
//! surfaces it out of band, mirroring the original's
//! `oobHandler(fromKey, toKey, data)` callback shape. The signed target
//! itself is this crate's [`PartialKeyHint`]: since the address derivation
//! here is a one-way hash rather than the original's invertible bit
//! transform, a receiver cannot reconstruct a candidate public key from a
//! bare address — it instead checks whether the hint's leading 8 bytes name
//! its own subnet, which is exactly the check spec.md describes
//! (`subnet(to_key) == self_subnet`) since an address's leading 8 bytes are
//! always its subnet.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::address::PartialKeyHint;
use crate::identity::{verify, Identity, SignatureBytes};
use crate::keystore::KeyStore;
use crate::transport::{OobMessage, OobTarget, Transport};

const TAG_LOOKUP: u8 = 0x01;
const TAG_RESPONSE: u8 = 0x02;

/// Drives the resolution handshake for one node: turns [`KeyStore`] cache
/// misses into signed LOOKUP messages, and inbound OOB traffic into
/// RESPONSEs or cache updates.
pub struct ResolutionHandler {
    identity: Arc<Identity>,
    transport: Arc<dyn Transport>,
    keystore: Arc<KeyStore>,
}

impl ResolutionHandler {
    pub fn new(identity: Arc<Identity>, transport: Arc<dyn Transport>, keystore: Arc<KeyStore>) -> Self {
        Self { identity, transport, keystore }
    }

    /// Drains `lookup_rx` (fed by [`KeyStore`] cache misses) and emits a
    /// signed LOOKUP for each hint. Intended to run as a long-lived task
    /// alongside [`Self::run_oob_loop`]; spec.md §5 treats both as
    /// independent tasks that may run concurrently with the ingress loop.
    pub async fn run_lookup_loop(&self, mut lookup_rx: mpsc::UnboundedReceiver<PartialKeyHint>) {
        while let Some(hint) = lookup_rx.recv().await {
            if let Err(err) = self.send_lookup(hint).await {
                debug!(%err, "failed to send key lookup");
            }
        }
    }

    /// Pulls inbound OOB messages off the transport and dispatches them to
    /// [`Self::on_lookup`] / [`Self::on_response`]. Intended to run as a
    /// long-lived task for the lifetime of the node.
    pub async fn run_oob_loop(&self) {
        loop {
            let (from_key, to_bytes, message) = match self.transport.recv_oob().await {
                Ok(v) => v,
                Err(err) => {
                    debug!(%err, "oob transport read failed, stopping resolution loop");
                    return;
                }
            };
            if message.len() != 1 + 64 {
                continue;
            }
            let tag = message[0];
            let sig: SignatureBytes = message[1..].try_into().expect("message is 65 bytes");
            match tag {
                TAG_LOOKUP => self.on_lookup(from_key, to_bytes, sig).await,
                TAG_RESPONSE => self.on_response(from_key, to_bytes, sig).await,
                _ => continue,
            }
        }
    }

    /// A received LOOKUP is answered only when `to_bytes` names our own
    /// subnet and the signature verifies.
    async fn on_lookup(&self, from_key: crate::identity::PublicKey, to_bytes: [u8; 32], sig: SignatureBytes) {
        if !PartialKeyHint::targets_subnet(&to_bytes, &self.keystore.self_subnet()) {
            return;
        }
        if !verify(&from_key, &to_bytes, &sig) {
            return;
        }
        trace!(from = %from_key, "answering key lookup");
        if let Err(err) = self.send_response(from_key).await {
            debug!(%err, "failed to send key response");
        }
    }

    /// A received RESPONSE is accepted only when its signature verifies; the
    /// resulting key is admitted to the cache unconditionally — spec.md §9
    /// preserves the original's TODO to track outstanding lookups as an open
    /// question, so any verified response is cached, not only solicited ones.
    async fn on_response(&self, from_key: crate::identity::PublicKey, to_bytes: [u8; 32], sig: SignatureBytes) {
        if !verify(&from_key, &to_bytes, &sig) {
            return;
        }
        self.keystore.update(from_key).await;
    }

    async fn send_lookup(&self, hint: PartialKeyHint) -> Result<(), crate::error::TransportError> {
        let sig = self.identity.sign(hint.as_bytes());
        let message = oob_message(TAG_LOOKUP, sig);
        self.transport.send_oob(OobTarget::Partial(hint), message).await
    }

    async fn send_response(&self, to: crate::identity::PublicKey) -> Result<(), crate::error::TransportError> {
        let sig = self.identity.sign(to.as_bytes());
        let message = oob_message(TAG_RESPONSE, sig);
        self.transport.send_oob(OobTarget::Key(to), message).await
    }
}

fn oob_message(tag: u8, sig: SignatureBytes) -> OobMessage {
    let mut message = [0u8; 65];
    message[0] = tag;
    message[1..].copy_from_slice(&sig);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address;
    use crate::identity::Identity;
    use crate::mock::MockNetwork;
    use tokio::sync::mpsc;

    fn handler(id: Identity, transport: Arc<dyn Transport>) -> (Arc<KeyStore>, ResolutionHandler, mpsc::UnboundedReceiver<PartialKeyHint>) {
        let id = Arc::new(id);
        let (lookup_tx, lookup_rx) = mpsc::unbounded_channel();
        let keystore = Arc::new(KeyStore::new(id.public_key(), Arc::clone(&transport), lookup_tx, 1280));
        let resolution = ResolutionHandler::new(Arc::clone(&id), transport, Arc::clone(&keystore));
        (keystore, resolution, lookup_rx)
    }

    #[tokio::test]
    async fn lookup_for_our_subnet_with_valid_signature_gets_a_response() {
        let network = MockNetwork::new();
        let responder_id = Identity::from_seed([1; 32]);
        let requester_id = Identity::from_seed([2; 32]);

        let responder_transport = Arc::new(network.join(responder_id.public_key(), 1280));
        let requester_transport = Arc::new(network.join(requester_id.public_key(), 1280));

        let (_store, responder, _rx) = handler(responder_id, responder_transport);

        let hint = address::subnet_for_key(&responder.keystore.self_key()).partial_key_hint();
        let sig = requester_id.sign(hint.as_bytes());
        responder
            .on_lookup(requester_id.public_key(), *hint.as_bytes(), sig)
            .await;

        let (from, _to, reply) = requester_transport.recv_oob().await.unwrap();
        assert_eq!(from, responder.keystore.self_key());
        assert_eq!(reply[0], TAG_RESPONSE);
    }

    #[tokio::test]
    async fn lookup_with_wrong_subnet_gets_no_response() {
        let network = MockNetwork::new();
        let responder_id = Identity::from_seed([3; 32]);
        let requester_id = Identity::from_seed([4; 32]);
        let other_id = Identity::from_seed([5; 32]);

        let responder_transport = Arc::new(network.join(responder_id.public_key(), 1280));
        let requester_transport = Arc::new(network.join(requester_id.public_key(), 1280));

        let (_store, responder, _rx) = handler(responder_id, responder_transport);

        let wrong_hint = address::subnet_for_key(&other_id.public_key()).partial_key_hint();
        let sig = requester_id.sign(wrong_hint.as_bytes());
        responder
            .on_lookup(requester_id.public_key(), *wrong_hint.as_bytes(), sig)
            .await;

        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), requester_transport.recv_oob())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn lookup_with_invalid_signature_gets_no_response() {
        let network = MockNetwork::new();
        let responder_id = Identity::from_seed([6; 32]);
        let requester_id = Identity::from_seed([7; 32]);
        let requester_transport = Arc::new(network.join(requester_id.public_key(), 1280));
        let responder_transport = Arc::new(network.join(responder_id.public_key(), 1280));

        let (_store, responder, _rx) = handler(responder_id, responder_transport);

        let hint = address::subnet_for_key(&responder.keystore.self_key()).partial_key_hint();
        let bogus_sig = [0u8; 64];
        responder
            .on_lookup(requester_id.public_key(), *hint.as_bytes(), bogus_sig)
            .await;

        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), requester_transport.recv_oob())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn verified_response_is_admitted_to_the_cache() {
        let network = MockNetwork::new();
        let me_id = Identity::from_seed([8; 32]);
        let peer_id = Identity::from_seed([9; 32]);
        let transport = Arc::new(network.join(me_id.public_key(), 1280));
        let peer_transport = network.join(peer_id.public_key(), 1280);

        let (store, resolution, mut lookup_rx) = handler(me_id, transport);

        let requested = store.self_key();
        let sig = peer_id.sign(requested.as_bytes());
        resolution
            .on_response(peer_id.public_key(), *requested.as_bytes(), sig)
            .await;

        // Already resolved: a send to the peer's address must forward
        // directly over the transport, not queue a fresh lookup.
        let addr = address::address_for_key(&peer_id.public_key());
        store.send_to_address(addr, vec![0x42]).await;

        assert!(lookup_rx.try_recv().is_err());
        let (from, payload) = peer_transport.recv().await.unwrap();
        assert_eq!(from, store.self_key());
        assert_eq!(payload, vec![0x42]);
    }
}

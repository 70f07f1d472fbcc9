//! The contract this crate expects from its external collaborators.
//!
//! spec.md §1 deliberately puts the packet-conn transport (the routing/
//! authenticated-delivery substrate), the tunnel device driver, and the
//! session-protocol handler out of scope: "external collaborators". This
//! module names their contracts precisely so a real transport, tunnel, and
//! protocol handler can be plugged into [`crate::node::Node`]; it does not
//! implement any of them (see [`crate::mock`] for the in-memory stand-ins used
//! by this crate's own tests and demonstration binary).
//!
//! A trait names each contract; concrete adapters implement it, and the rest
//! of the crate is generic over the trait object.

use crate::error::TransportError;
use crate::identity::PublicKey;

/// Exactly `1 + 64` bytes: a tag byte followed by an Ed25519 signature
/// (spec.md §6, out-of-band framing).
pub type OobMessage = [u8; 65];

/// Where an out-of-band resolution message is addressed.
///
/// A LOOKUP is addressed to a [`OobTarget::Partial`] hint derived from the
/// target address/subnet — the underlying transport is expected to route it
/// toward whichever node's own key shares the required prefix (spec.md §4.4).
/// A RESPONSE is addressed directly to the requester's full key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobTarget {
    Key(PublicKey),
    Partial(crate::address::PartialKeyHint),
}

impl OobTarget {
    /// The raw 32 bytes this target was addressed with — what the sender
    /// signed over, and what [`Transport::recv_oob`] hands back to the
    /// receiver as `to_bytes`, mirroring the original's
    /// `oobHandler(fromKey, toKey, data)` callback shape.
    pub fn as_bytes(&self) -> [u8; 32] {
        match self {
            OobTarget::Key(k) => *k.as_bytes(),
            OobTarget::Partial(h) => *h.as_bytes(),
        }
    }
}

/// The packet-conn transport: authenticated peer-to-peer delivery keyed by
/// public key, plus the out-of-band sideband used for key resolution.
///
/// All methods are async so implementations can perform real I/O; per
/// spec.md §5, [`crate::node::Node`] never holds the key-store lock across a
/// call into this trait.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// The transport's current effective tunnel MTU.
    fn mtu(&self) -> u16;

    /// Sends `frame` (already carrying the session-type tag) to the peer
    /// identified by `to`. Best-effort: spec.md §4.3 says transport write
    /// errors are swallowed by the caller, not retried here.
    async fn send(&self, to: PublicKey, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Blocks until the next session-tagged frame arrives from any peer.
    async fn recv(&self) -> Result<(PublicKey, Vec<u8>), TransportError>;

    /// Sends an out-of-band resolution message toward `target`.
    async fn send_oob(&self, target: OobTarget, message: OobMessage) -> Result<(), TransportError>;

    /// Blocks until the next out-of-band resolution message arrives, yielding
    /// the sender's key, the 32 bytes the message was addressed to (the
    /// value the sender signed over), and the message itself.
    async fn recv_oob(&self) -> Result<(PublicKey, [u8; 32], OobMessage), TransportError>;
}

/// The session-protocol handler: receives opaque `session-proto`-tagged
/// payloads demultiplexed out of the ingress path (spec.md §4.5 step 3).
/// Entirely out of scope for this crate beyond naming the contract.
#[async_trait::async_trait]
pub trait ProtocolHandler: Send + Sync {
    async fn handle(&self, from: PublicKey, payload: Vec<u8>);
}

//! The error taxonomy of the peer key-resolution and session I/O layer.
//!
//! `write_packet` returns structured errors to its caller so a tunnel driver can
//! decide whether to synthesize its own ICMP reply. `read_packet` only ever
//! returns a [`TransportError`] — every other protocol violation (bad header,
//! failed verification, unknown tag, over-MTU frame) is logged and dropped, and
//! the read loop continues.

use std::net::Ipv6Addr;

/// Errors returned from [`crate::node::Node::write_packet`].
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// `frame[0] & 0xF0 != 0x60`.
    #[error("not an IPv6 packet (version nibble 0x{0:x})")]
    NotIpv6(u8),

    /// `len(frame) < 40`.
    #[error("undersized IPv6 packet: {0} bytes")]
    Undersized(usize),

    /// Neither the node's own address nor its own subnet.
    #[error("incorrect source address: {0}")]
    WrongSource(Ipv6Addr),

    /// Destination is neither a valid overlay address nor a valid overlay subnet.
    #[error("destination is neither a valid overlay address nor subnet")]
    NoDestination,

    /// Propagated from the underlying transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors surfaced from the underlying packet-conn transport.
///
/// This is the only error variant [`crate::node::Node::read_packet`] returns —
/// all other ingress-side issues (malformed frames, spoofed sources, failed
/// signatures) are dropped silently and the read loop continues.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

//! Peer key-resolution and session I/O layer for an Ed25519-addressed IPv6
//! overlay network.
//!
//! Every node is assigned an IPv6 address and /64 subnet derived
//! deterministically from its long-term Ed25519 public key ([`address`]).
//! Applications hand this crate IPv6 datagrams ([`packet::write_packet`]); it
//! resolves the destination's public key through a signed out-of-band
//! lookup/response protocol ([`resolution`]), caches the result
//! ([`keystore`]), verifies inbound traffic is authentic for its claimed
//! address, and emits ICMPv6 "Packet Too Big" replies when a datagram
//! exceeds the negotiated MTU ([`icmp`]).
//!
//! The tunnel device driver, the routing/transport substrate, and the
//! session-protocol handler are external collaborators this crate only
//! names the contract for — see [`transport`]. [`node::Node`] assembles the
//! rest into the entry point a real driver holds onto; [`mock`] is a
//! reference transport good enough to exercise it without one.

pub mod address;
pub mod config;
pub mod error;
pub mod icmp;
pub mod identity;
pub mod keystore;
pub mod mock;
pub mod node;
pub mod packet;
pub mod resolution;
pub mod transport;

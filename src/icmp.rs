//! ICMPv6 Packet-Too-Big builder (spec.md §4.3 / §6).
//!
//! Constructs a complete IPv6 datagram carrying an ICMPv6 "Packet Too Big"
//! (type 2, code 0) message, addressed from the offending datagram's destination
//! back to its source, carrying the effective MTU and the first 40 bytes of the
//! offending datagram. The caller re-enters the built datagram through
//! [`crate::node::Node::write_packet`].

const ICMPV6_NEXT_HEADER: u8 = 58;
const ICMPV6_TYPE_PACKET_TOO_BIG: u8 = 2;
const ICMPV6_CODE: u8 = 0;
/// Header + type/code/checksum/mtu + 40-byte original-packet prefix.
const ICMPV6_PAYLOAD_LEN: usize = 8 + 40;

/// Builds an IPv6 datagram carrying an ICMPv6 Packet-Too-Big message for
/// `offending`, an IPv6 datagram whose length exceeded `mtu`.
///
/// `offending` must be at least 40 bytes (a full IPv6 header); callers are
/// expected to have already validated this via [`crate::packet`]'s header
/// checks before reaching the MTU-enforcement step.
pub fn packet_too_big(offending: &[u8], mtu: u16) -> Vec<u8> {
    debug_assert!(offending.len() >= 40, "offending datagram has no IPv6 header");

    let offending_src: [u8; 16] = offending[8..24].try_into().expect("slice is 16 bytes");
    let offending_dst: [u8; 16] = offending[24..40].try_into().expect("slice is 16 bytes");

    // Reply is addressed from the offender's destination back to its source.
    let reply_src = offending_dst;
    let reply_dst = offending_src;

    let mut icmp_payload = Vec::with_capacity(ICMPV6_PAYLOAD_LEN);
    icmp_payload.push(ICMPV6_TYPE_PACKET_TOO_BIG);
    icmp_payload.push(ICMPV6_CODE);
    icmp_payload.extend_from_slice(&[0u8, 0u8]); // checksum placeholder
    icmp_payload.extend_from_slice(&(mtu as u32).to_be_bytes());
    icmp_payload.extend_from_slice(&offending[..40]);

    let checksum = icmpv6_checksum(&reply_src, &reply_dst, &icmp_payload);
    icmp_payload[2..4].copy_from_slice(&checksum.to_be_bytes());

    let mut datagram = Vec::with_capacity(40 + icmp_payload.len());
    datagram.push(0x60); // version 6, no traffic class/flow label
    datagram.extend_from_slice(&[0u8, 0u8, 0u8]);
    datagram.extend_from_slice(&(icmp_payload.len() as u16).to_be_bytes()); // payload length
    datagram.push(ICMPV6_NEXT_HEADER);
    datagram.push(64); // hop limit
    datagram.extend_from_slice(&reply_src);
    datagram.extend_from_slice(&reply_dst);
    datagram.extend_from_slice(&icmp_payload);
    datagram
}

/// RFC 8200 upper-layer checksum: IPv6 pseudo-header + ICMPv6 message, ones'-complement sum.
fn icmpv6_checksum(src: &[u8; 16], dst: &[u8; 16], icmp_payload: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for chunk in src.chunks_exact(2).chain(dst.chunks_exact(2)) {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    sum += (icmp_payload.len() as u32) >> 16;
    sum += (icmp_payload.len() as u32) & 0xffff;
    sum += ICMPV6_NEXT_HEADER as u32;

    let mut chunks = icmp_payload.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += u16::from_be_bytes([*last, 0]) as u32;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

//! The ingress/egress packet path: `write_packet` / `read_packet` (spec.md
//! §4.5). Validates IPv6 headers, enforces MTU, demultiplexes by session
//! type, and hands resolved flows to the [`KeyStore`] and the transport.

use crate::address::Address;
use crate::error::PacketError;
use crate::icmp;
use crate::keystore::KeyStore;
use crate::transport::{ProtocolHandler, Transport};
use tracing::{debug, trace};

/// Session traffic: an inner IPv6 datagram follows.
pub const TAG_SESSION_TRAFFIC: u8 = 0x01;
/// Session protocol: an opaque payload follows, for the protocol handler.
pub const TAG_SESSION_PROTO: u8 = 0x02;

/// Validates and dispatches an outbound IPv6 frame. Returns the original
/// frame length on successful dispatch, matching the original's contract of
/// reporting "bytes accepted from caller" even though only a tagged copy was
/// actually transmitted (spec.md §9).
pub async fn write_packet(keystore: &KeyStore, frame: &[u8]) -> Result<usize, PacketError> {
    let version_nibble = frame.first().copied().unwrap_or(0);
    if version_nibble & 0xF0 != 0x60 {
        return Err(PacketError::NotIpv6(version_nibble));
    }
    if frame.len() < 40 {
        return Err(PacketError::Undersized(frame.len()));
    }

    let src = Address::from_bytes(frame[8..24].try_into().expect("slice is 16 bytes"));
    let dst = Address::from_bytes(frame[24..40].try_into().expect("slice is 16 bytes"));
    let src_subnet = src.subnet();
    let dst_subnet = dst.subnet();

    if src != keystore.self_address() && src_subnet != keystore.self_subnet() {
        // Expected to be common (link-local noise), so debug rather than warn.
        debug!(src = %src.to_ipv6(), "egress frame has incorrect source address");
        return Err(PacketError::WrongSource(src.to_ipv6()));
    }

    let mut tagged = Vec::with_capacity(1 + frame.len());
    tagged.push(TAG_SESSION_TRAFFIC);
    tagged.extend_from_slice(frame);

    if dst.is_valid() {
        keystore.send_to_address(dst, tagged).await;
    } else if dst_subnet.is_valid() {
        keystore.send_to_subnet(dst_subnet, tagged).await;
    } else {
        return Err(PacketError::NoDestination);
    }
    Ok(frame.len())
}

/// Blocks until a deliverable IPv6 frame is produced, copying it into
/// `out_buf` and returning its length. Session-proto traffic is handed to
/// `protocol` and consumed without returning. Every other protocol violation
/// (malformed header, spoofed source, misdelivery, unknown tag) is dropped
/// and the loop continues — only a transport error aborts the call.
pub async fn read_packet(
    keystore: &KeyStore,
    transport: &dyn Transport,
    protocol: &dyn ProtocolHandler,
    out_buf: &mut Vec<u8>,
) -> Result<usize, crate::error::TransportError> {
    loop {
        let (peer_key, payload) = transport.recv().await?;
        if payload.is_empty() {
            continue;
        }

        match payload[0] {
            TAG_SESSION_PROTO => {
                protocol.handle(peer_key, payload[1..].to_vec()).await;
                continue;
            }
            TAG_SESSION_TRAFFIC => {}
            _ => continue,
        }

        let inner = &payload[1..];
        if inner.is_empty() || inner[0] & 0xF0 != 0x60 || inner.len() < 40 {
            continue;
        }

        let mtu = keystore.mtu().await;
        if inner.len() > mtu as usize {
            let reply = icmp::packet_too_big(inner, mtu);
            // Best-effort: the reply's src is the offending datagram's dst,
            // which may not be ours if this frame was misdelivered; in that
            // case write_packet rejects it with WrongSource and we move on.
            let _ = write_packet(keystore, &reply).await;
            continue;
        }

        let inner_dst = Address::from_bytes(inner[24..40].try_into().expect("checked length"));
        if inner_dst != keystore.self_address() && inner_dst.subnet() != keystore.self_subnet() {
            trace!(peer = %peer_key, "dropping misdelivered frame");
            continue;
        }

        let info = keystore.update(peer_key).await;

        let inner_src = Address::from_bytes(inner[8..24].try_into().expect("checked length"));
        if inner_src != info.address && inner_src.subnet() != info.subnet {
            trace!(peer = %peer_key, "dropping spoofed-source frame");
            continue;
        }

        out_buf.clear();
        out_buf.extend_from_slice(inner);
        return Ok(out_buf.len());
    }
}

/// Frames an opaque payload with the session-proto tag, for callers that
/// want to send it through a [`Transport`] directly.
pub fn session_proto_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(1 + payload.len());
    framed.push(TAG_SESSION_PROTO);
    framed.extend_from_slice(payload);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::mock::MockNetwork;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn ipv6_frame(src: [u8; 16], dst: [u8; 16], len: usize) -> Vec<u8> {
        let mut frame = vec![0u8; len];
        frame[0] = 0x60;
        frame[8..24].copy_from_slice(&src);
        frame[24..40].copy_from_slice(&dst);
        frame
    }

    fn store_for(id: &Identity, transport: Arc<dyn Transport>) -> KeyStore {
        let (tx, _rx) = mpsc::unbounded_channel();
        KeyStore::new(id.public_key(), transport, tx, 1280)
    }

    fn store_with_lookups(
        id: &Identity,
        transport: Arc<dyn Transport>,
    ) -> (KeyStore, mpsc::UnboundedReceiver<crate::address::PartialKeyHint>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (KeyStore::new(id.public_key(), transport, tx, 1280), rx)
    }

    #[tokio::test]
    async fn write_packet_rejects_non_ipv6() {
        let id = Identity::from_seed([1; 32]);
        let network = MockNetwork::new();
        let transport = Arc::new(network.join(id.public_key(), 1280));
        let store = store_for(&id, transport);

        let frame = vec![0x40; 40];
        let err = write_packet(&store, &frame).await.unwrap_err();
        assert!(matches!(err, PacketError::NotIpv6(_)));
    }

    #[tokio::test]
    async fn write_packet_rejects_undersized_frame() {
        let id = Identity::from_seed([2; 32]);
        let network = MockNetwork::new();
        let transport = Arc::new(network.join(id.public_key(), 1280));
        let store = store_for(&id, transport);

        let mut frame = vec![0u8; 10];
        frame[0] = 0x60;
        let err = write_packet(&store, &frame).await.unwrap_err();
        assert!(matches!(err, PacketError::Undersized(10)));
    }

    #[tokio::test]
    async fn write_packet_rejects_foreign_source() {
        let id = Identity::from_seed([3; 32]);
        let network = MockNetwork::new();
        let transport = Arc::new(network.join(id.public_key(), 1280));
        let store = store_for(&id, transport);

        let other = crate::address::Address::from_bytes([0xfc; 16]);
        let dst = crate::address::address_for_key(&Identity::from_seed([4; 32]).public_key());
        let frame = ipv6_frame(*other.as_bytes(), *dst.as_bytes(), 60);
        let err = write_packet(&store, &frame).await.unwrap_err();
        assert!(matches!(err, PacketError::WrongSource(_)));
    }

    #[tokio::test]
    async fn write_packet_rejects_non_overlay_destination() {
        let id = Identity::from_seed([5; 32]);
        let network = MockNetwork::new();
        let transport = Arc::new(network.join(id.public_key(), 1280));
        let store = store_for(&id, transport);

        let self_addr = store.self_address();
        let frame = ipv6_frame(*self_addr.as_bytes(), [0u8; 16], 60);
        let err = write_packet(&store, &frame).await.unwrap_err();
        assert!(matches!(err, PacketError::NoDestination));
    }

    #[tokio::test]
    async fn write_packet_on_cold_destination_buffers_and_returns_frame_len() {
        let id = Identity::from_seed([6; 32]);
        let network = MockNetwork::new();
        let transport = Arc::new(network.join(id.public_key(), 1280));
        let store = store_for(&id, transport);

        let self_addr = store.self_address();
        let peer_addr = crate::address::address_for_key(&Identity::from_seed([7; 32]).public_key());
        let frame = ipv6_frame(*self_addr.as_bytes(), *peer_addr.as_bytes(), 80);
        let n = write_packet(&store, &frame).await.unwrap();
        assert_eq!(n, 80);
    }

    #[tokio::test]
    async fn write_packet_routes_a_subnet_only_destination_through_send_to_subnet() {
        let id = Identity::from_seed([8; 32]);
        let network = MockNetwork::new();
        let transport = Arc::new(network.join(id.public_key(), 1280));
        let (store, mut lookup_rx) = store_with_lookups(&id, transport);

        // A destination inside a peer's subnet that isn't the peer's own
        // derived address: `dst.is_valid()` must be false while
        // `dst.subnet().is_valid()` is true, so egress dispatch falls
        // through to `send_to_subnet` rather than `send_to_address`.
        let peer = Identity::from_seed([9; 32]).public_key();
        let subnet = crate::address::subnet_for_key(&peer);
        let mut dst_bytes = [0u8; 16];
        dst_bytes[..8].copy_from_slice(subnet.as_bytes());
        dst_bytes[8] = 0x00;
        let dst = crate::address::Address::from_bytes(dst_bytes);
        assert!(!dst.is_valid());
        assert!(dst.subnet().is_valid());

        let self_addr = store.self_address();
        let frame = ipv6_frame(*self_addr.as_bytes(), dst_bytes, 60);
        write_packet(&store, &frame).await.unwrap();

        let hint = lookup_rx.try_recv().expect("send_to_subnet should fire a lookup");
        assert_eq!(hint, subnet.partial_key_hint());
    }
}

//! The Address Deriver: a pure, deterministic mapping from a node's long-term
//! Ed25519 public key to its overlay IPv6 address and /64 subnet.
//!
//! The overlay's exact bit layout is an implementation detail this module
//! doesn't reproduce bit-for-bit; instead it implements a concrete derivation
//! that satisfies the two contracts the rest of the crate relies on:
//!
//! - `subnet(k)` equals the first 8 bytes of `address(k)`.
//! - The mapping is practically injective (collision probability negligible).

use crate::identity::PublicKey;
use std::fmt;
use std::net::Ipv6Addr;

/// Fixed prefix byte marking an address or subnet as belonging to this
/// overlay. Lives at byte 0, inside the 8-byte span shared between an
/// [`Address`] and its containing [`Subnet`].
pub const OVERLAY_PREFIX: u8 = 0xfc;

/// Marker byte identifying a full 16-byte value as the canonical address
/// this overlay derived for some key, as opposed to an arbitrary host
/// address routed via a peer's advertised `/64` subnet. Lives at byte 8,
/// the first byte of the half an [`Address`] carries beyond its [`Subnet`]
/// prefix, so it cannot be tested from a bare `Subnet` value.
pub const ADDRESS_HOST_MARKER: u8 = 0xa5;

/// A 16-byte IPv6 address deterministically derived from a [`PublicKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 16]);

/// The /64 prefix of an [`Address`]; shared by every address derived from the
/// same key (in this system, a singleton per key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subnet([u8; 8]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// First 8 bytes of this address, as its containing [`Subnet`].
    pub fn subnet(&self) -> Subnet {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        Subnet(bytes)
    }

    /// Whether this is a canonical overlay address: its subnet prefix
    /// matches the overlay, and it carries the host marker that only a
    /// key's own derived address sets. An arbitrary host address within a
    /// peer's advertised subnet carries a valid subnet prefix without this
    /// marker, so it fails this check while still passing
    /// [`Subnet::is_valid`] on its containing subnet.
    pub fn is_valid(&self) -> bool {
        self.0[0] == OVERLAY_PREFIX && self.0[8] == ADDRESS_HOST_MARKER
    }

    pub fn to_ipv6(self) -> Ipv6Addr {
        Ipv6Addr::from(self.0)
    }
}

impl Subnet {
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Whether this /64 prefix belongs to the overlay. Only the shared
    /// prefix byte is checked — a [`Subnet`] has no host half to carry
    /// [`ADDRESS_HOST_MARKER`], so any address sharing this prefix,
    /// canonical or not, makes it valid.
    pub fn is_valid(&self) -> bool {
        self.0[0] == OVERLAY_PREFIX
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ipv6())
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut full = [0u8; 16];
        full[..8].copy_from_slice(&self.0);
        write!(f, "{}/64", Ipv6Addr::from(full))
    }
}

/// Derives the overlay [`Address`] for a public key.
///
/// `address(k)[0] == OVERLAY_PREFIX` and `address(k)[8] ==
/// ADDRESS_HOST_MARKER`; the other 14 bytes come from a BLAKE3 hash of the
/// raw key bytes, so the mapping is deterministic and, over the 256-bit
/// input domain, practically injective.
pub fn address_for_key(key: &PublicKey) -> Address {
    let digest = blake3::hash(key.as_bytes());
    let hash_bytes = digest.as_bytes();
    let mut out = [0u8; 16];
    out[0] = OVERLAY_PREFIX;
    out[1..8].copy_from_slice(&hash_bytes[..7]);
    out[8] = ADDRESS_HOST_MARKER;
    out[9..].copy_from_slice(&hash_bytes[7..14]);
    Address(out)
}

/// Derives the overlay [`Subnet`] for a public key.
///
/// Always equal to `address_for_key(k).subnet()`; exposed separately because
/// the store indexes on it directly.
pub fn subnet_for_key(key: &PublicKey) -> Subnet {
    address_for_key(key).subnet()
}

/// A 32-byte routing hint derived from an address or subnet, used to address a
/// LOOKUP toward the region of key space a target's address was derived from.
///
/// Unlike `address_for_key`, this crate's derivation (a BLAKE3 hash) is not
/// invertible, so a hint cannot be recovered into the bits of an actual
/// public key the way the original overlay's bit-transform address scheme
/// allows. The hint is zero-extended prefix bytes instead: opaque to this
/// crate, meaningful only to the transport's own key-space routing, which is
/// out of scope here (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialKeyHint([u8; 32]);

impl PartialKeyHint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether raw hint/target bytes received over the wire fall within
    /// `subnet` — true whenever the leading 8 bytes match, since both an
    /// address-hint and a subnet-hint carry the owning subnet in that
    /// position (an address's first 8 bytes are always its subnet).
    pub fn targets_subnet(bytes: &[u8; 32], subnet: &Subnet) -> bool {
        bytes[..8] == subnet.0
    }
}

impl Address {
    /// The routing hint transport implementations use to steer a LOOKUP
    /// toward this address's region of key space.
    pub fn partial_key_hint(&self) -> PartialKeyHint {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&self.0);
        PartialKeyHint(out)
    }
}

impl Subnet {
    /// The routing hint transport implementations use to steer a LOOKUP
    /// toward this subnet's region of key space.
    pub fn partial_key_hint(&self) -> PartialKeyHint {
        let mut out = [0u8; 32];
        out[..8].copy_from_slice(&self.0);
        PartialKeyHint(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn key(seed: u8) -> PublicKey {
        Identity::from_seed([seed; 32]).public_key()
    }

    #[test]
    fn subnet_is_prefix_of_address() {
        let k = key(1);
        let addr = address_for_key(&k);
        let subnet = subnet_for_key(&k);
        assert_eq!(&addr.as_bytes()[..8], subnet.as_bytes());
    }

    #[test]
    fn derivation_is_deterministic() {
        let k = key(7);
        assert_eq!(address_for_key(&k), address_for_key(&k));
        assert_eq!(subnet_for_key(&k), subnet_for_key(&k));
    }

    #[test]
    fn distinct_keys_yield_distinct_addresses() {
        let a = address_for_key(&key(1));
        let b = address_for_key(&key(2));
        assert_ne!(a, b);
    }

    #[test]
    fn derived_addresses_carry_overlay_prefix() {
        let addr = address_for_key(&key(3));
        assert!(addr.is_valid());
        assert!(addr.subnet().is_valid());
    }

    #[test]
    fn non_overlay_prefix_is_invalid() {
        let addr = Address::from_bytes([0xfd; 16]);
        assert!(!addr.is_valid());
    }

    #[test]
    fn host_within_a_valid_subnet_need_not_be_a_valid_address() {
        // A destination sharing a key's subnet prefix but not its exact
        // derived address: e.g. another host routed behind that peer.
        let subnet = subnet_for_key(&key(4));
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(subnet.as_bytes());
        bytes[8] = 0x00; // anything but ADDRESS_HOST_MARKER
        assert_ne!(bytes[8], ADDRESS_HOST_MARKER);
        let dst = Address::from_bytes(bytes);

        assert!(dst.subnet().is_valid());
        assert!(!dst.is_valid());
    }
}

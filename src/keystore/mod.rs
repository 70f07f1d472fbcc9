//! The Key Store: a multi-index cache binding recently-used public keys to
//! their derived address/subnet and to at most one pending outbound datagram.
//!
//! Three indices reference one logical record, following the arena pattern
//! spec.md §9 suggests for a strict-ownership language: `by_key` owns the
//! [`KeyInfo`], and `by_addr`/`by_subnet` are `map<_, PublicKey>` handles back
//! into it, rather than three maps each owning a copy. A single
//! `tokio::sync::Mutex` guards all five maps and the `mtu` field; the rule
//! throughout is never to hold that lock across an `.await`. Every public
//! method here enters the lock, mutates or snapshots, exits, and only then
//! performs transport I/O.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::address::{self, Address, PartialKeyHint, Subnet};
use crate::identity::PublicKey;
use crate::transport::Transport;

/// The idle TTL applied uniformly to resolved entries and pending buffers.
pub const T_KEEP: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
struct KeyInfo {
    key: PublicKey,
    address: Address,
    subnet: Subnet,
    expiry: Instant,
}

#[derive(Debug)]
struct PendingBuffer {
    packet: Vec<u8>,
    expiry: Instant,
}

struct Inner {
    by_key: HashMap<PublicKey, KeyInfo>,
    by_addr: HashMap<Address, PublicKey>,
    by_subnet: HashMap<Subnet, PublicKey>,
    pending_by_addr: HashMap<Address, PendingBuffer>,
    pending_by_subnet: HashMap<Subnet, PendingBuffer>,
    mtu: u16,
}

/// A snapshot of a resolved peer's identity, handed back to callers that
/// need to check address/subnet binding without holding the store's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfoView {
    pub key: PublicKey,
    pub address: Address,
    pub subnet: Subnet,
}

impl From<&KeyInfo> for KeyInfoView {
    fn from(info: &KeyInfo) -> Self {
        Self {
            key: info.key,
            address: info.address,
            subnet: info.subnet,
        }
    }
}

/// The cache of resolved identities with three indices, per-entry TTL, and
/// per-destination pending-packet slots (spec.md §3–§4.3).
pub struct KeyStore {
    self_key: PublicKey,
    self_address: Address,
    self_subnet: Subnet,
    transport: Arc<dyn Transport>,
    lookup_tx: mpsc::UnboundedSender<PartialKeyHint>,
    inner: Mutex<Inner>,
}

impl KeyStore {
    /// Builds an empty store for `self_key`. `lookup_tx` is the channel a
    /// resolution task drains to turn cache misses into signed LOOKUP
    /// messages — decoupled from the store so the lock is never held while
    /// signing or calling into the transport.
    pub fn new(
        self_key: PublicKey,
        transport: Arc<dyn Transport>,
        lookup_tx: mpsc::UnboundedSender<PartialKeyHint>,
        mtu: u16,
    ) -> Self {
        Self {
            self_key,
            self_address: address::address_for_key(&self_key),
            self_subnet: address::subnet_for_key(&self_key),
            transport,
            lookup_tx,
            inner: Mutex::new(Inner {
                by_key: HashMap::new(),
                by_addr: HashMap::new(),
                by_subnet: HashMap::new(),
                pending_by_addr: HashMap::new(),
                pending_by_subnet: HashMap::new(),
                mtu,
            }),
        }
    }

    pub fn self_key(&self) -> PublicKey {
        self.self_key
    }

    pub fn self_address(&self) -> Address {
        self.self_address
    }

    pub fn self_subnet(&self) -> Subnet {
        self.self_subnet
    }

    pub async fn mtu(&self) -> u16 {
        self.inner.lock().await.mtu
    }

    pub async fn set_mtu(&self, mtu: u16) {
        self.inner.lock().await.mtu = mtu;
    }

    /// `frame` already bears the session-type prefix. If `addr` resolves,
    /// refreshes its info and forwards via the transport; else installs
    /// `frame` as the single pending packet for `addr` and fires a LOOKUP.
    pub async fn send_to_address(&self, addr: Address, frame: Vec<u8>) {
        let now = Instant::now();
        let resolved = {
            let mut inner = self.inner.lock().await;
            resolve_and_refresh(&mut inner, ByAddr(addr), now)
        };
        match resolved {
            Some(key) => self.forward(key, frame).await,
            None => {
                {
                    let mut inner = self.inner.lock().await;
                    inner
                        .pending_by_addr
                        .insert(addr, PendingBuffer { packet: frame, expiry: now + T_KEEP });
                }
                let _ = self.lookup_tx.send(addr.partial_key_hint());
            }
        }
    }

    /// Same pattern as [`Self::send_to_address`] against the subnet indices.
    pub async fn send_to_subnet(&self, subnet: Subnet, frame: Vec<u8>) {
        let now = Instant::now();
        let resolved = {
            let mut inner = self.inner.lock().await;
            resolve_and_refresh(&mut inner, BySubnet(subnet), now)
        };
        match resolved {
            Some(key) => self.forward(key, frame).await,
            None => {
                {
                    let mut inner = self.inner.lock().await;
                    inner
                        .pending_by_subnet
                        .insert(subnet, PendingBuffer { packet: frame, expiry: now + T_KEEP });
                }
                let _ = self.lookup_tx.send(subnet.partial_key_hint());
            }
        }
    }

    /// Called on every authenticated ingress. Allocates and indexes a
    /// [`KeyInfo`] for `peer_key` if unknown, draining any pending packet for
    /// its derived address/subnet; refreshes its expiry either way.
    pub async fn update(&self, peer_key: PublicKey) -> KeyInfoView {
        let now = Instant::now();
        let (view, drained) = {
            let mut inner = self.inner.lock().await;
            evict_if_expired(&mut inner, &peer_key, now);
            if let Some(existing) = inner.by_key.get_mut(&peer_key) {
                existing.expiry = now + T_KEEP;
                (KeyInfoView::from(&*existing), Vec::new())
            } else {
                let addr = address::address_for_key(&peer_key);
                let subnet = address::subnet_for_key(&peer_key);
                let info = KeyInfo {
                    key: peer_key,
                    address: addr,
                    subnet,
                    expiry: now + T_KEEP,
                };
                inner.by_key.insert(peer_key, info.clone());
                inner.by_addr.insert(addr, peer_key);
                inner.by_subnet.insert(subnet, peer_key);

                let mut drained = Vec::new();
                if let Some(buf) = inner.pending_by_addr.remove(&addr) {
                    if buf.expiry > now {
                        drained.push(buf.packet);
                    }
                }
                if let Some(buf) = inner.pending_by_subnet.remove(&subnet) {
                    if buf.expiry > now {
                        drained.push(buf.packet);
                    }
                }
                (KeyInfoView::from(&info), drained)
            }
        };
        for packet in drained {
            if let Err(err) = self.transport.send(peer_key, packet).await {
                debug!(peer = %peer_key, %err, "dropping drained pending packet");
            }
        }
        view
    }

    /// Evicts every entry and pending buffer whose deadline has already
    /// passed. Opportunistic lookups already evict on access; this is the
    /// coarse sweep spec.md §9 allows for reclaiming destinations nobody
    /// queries again, intended to be driven by a periodic background tick
    /// (see `crate::node::Node::run_expiry_sweep`).
    pub async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let expired: Vec<PublicKey> = inner
            .by_key
            .iter()
            .filter(|(_, info)| info.expiry <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            if let Some(info) = inner.by_key.remove(&key) {
                inner.by_addr.remove(&info.address);
                inner.by_subnet.remove(&info.subnet);
                trace!(peer = %key, "swept expired key info");
            }
        }
        inner.pending_by_addr.retain(|_, buf| buf.expiry > now);
        inner.pending_by_subnet.retain(|_, buf| buf.expiry > now);
    }

    async fn forward(&self, key: PublicKey, frame: Vec<u8>) {
        if let Err(err) = self.transport.send(key, frame).await {
            debug!(peer = %key, %err, "transport send failed, dropping packet");
        }
    }
}

/// Picks which index `resolve_and_refresh` consults.
trait Index {
    fn lookup(self, inner: &Inner) -> Option<PublicKey>;
}
struct ByAddr(Address);
struct BySubnet(Subnet);
impl Index for ByAddr {
    fn lookup(self, inner: &Inner) -> Option<PublicKey> {
        inner.by_addr.get(&self.0).copied()
    }
}
impl Index for BySubnet {
    fn lookup(self, inner: &Inner) -> Option<PublicKey> {
        inner.by_subnet.get(&self.0).copied()
    }
}

/// Looks a destination up through `idx`, evicting it first if its deadline
/// has already passed, and refreshes its expiry on a hit.
fn resolve_and_refresh(inner: &mut Inner, idx: impl Index, now: Instant) -> Option<PublicKey> {
    let key = idx.lookup(inner)?;
    evict_if_expired(inner, &key, now);
    let info = inner.by_key.get_mut(&key)?;
    info.expiry = now + T_KEEP;
    Some(key)
}

fn evict_if_expired(inner: &mut Inner, key: &PublicKey, now: Instant) {
    let expired = matches!(inner.by_key.get(key), Some(info) if info.expiry <= now);
    if expired {
        if let Some(info) = inner.by_key.remove(key) {
            inner.by_addr.remove(&info.address);
            inner.by_subnet.remove(&info.subnet);
        }
    }
}

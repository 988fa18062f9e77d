//! Local directory of known peers: key material and dialable addresses.
//!
//! Every address carries an expiry derived from its [`AddrTtl`] class.
//! Expired addresses are invisible to readers and are dropped by [`Peerstore::gc`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use libp2p::identity::{Keypair, PublicKey};
use libp2p::{Multiaddr, PeerId};
use tokio::time::Instant;

use crate::error::DirectoryError;
use crate::keys::NodeIdentity;

/// How long an address stays valid after it is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddrTtl {
    Temporary,
    RecentlyConnected,
    Provider,
    Standard,
    /// Never expires. Used for configured bootstrap peers.
    Permanent,
}

impl AddrTtl {
    /// `None` means the address never expires.
    pub fn duration(self) -> Option<Duration> {
        match self {
            AddrTtl::Temporary => Some(Duration::from_secs(2 * 60)),
            AddrTtl::RecentlyConnected => Some(Duration::from_secs(15 * 60)),
            AddrTtl::Provider => Some(Duration::from_secs(30 * 60)),
            AddrTtl::Standard => Some(Duration::from_secs(60 * 60)),
            AddrTtl::Permanent => None,
        }
    }

    fn expiry_from(self, now: Instant) -> Expiry {
        match self.duration() {
            Some(ttl) => Expiry::At(now + ttl),
            None => Expiry::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Expiry {
    At(Instant),
    Never,
}

impl Expiry {
    fn is_live(self, now: Instant) -> bool {
        match self {
            Expiry::At(deadline) => deadline > now,
            Expiry::Never => true,
        }
    }
}

/// A peer id together with every live address known for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

#[derive(Default)]
struct PeerRecord {
    keypair: Option<Keypair>,
    public_key: Option<PublicKey>,
    // Insertion order is kept so dial order follows discovery order.
    addrs: Vec<(Multiaddr, Expiry)>,
}

impl PeerRecord {
    fn live_addrs(&self, now: Instant) -> Vec<Multiaddr> {
        self.addrs
            .iter()
            .filter(|(_, expiry)| expiry.is_live(now))
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    // A remote public key alone does not keep a record; identify restores it
    // on the next connection.
    fn is_collectable(&self) -> bool {
        self.keypair.is_none() && self.addrs.is_empty()
    }
}

/// Shared, thread-safe peer directory. Clones share the same state.
#[derive(Clone, Default)]
pub struct Peerstore {
    inner: Arc<RwLock<HashMap<PeerId, PeerRecord>>>,
}

impl Peerstore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PeerId, PeerRecord>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PeerId, PeerRecord>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the local node's private and public key material.
    pub fn register_self(&self, identity: &NodeIdentity) -> Result<(), DirectoryError> {
        self.add_private_key(identity.peer_id(), identity.keypair().clone())?;
        self.add_public_key(identity.peer_id(), identity.public())
    }

    pub fn add_private_key(&self, peer_id: PeerId, keypair: Keypair) -> Result<(), DirectoryError> {
        check_owner(peer_id, &keypair.public())?;
        self.write().entry(peer_id).or_default().keypair = Some(keypair);
        Ok(())
    }

    pub fn add_public_key(&self, peer_id: PeerId, key: PublicKey) -> Result<(), DirectoryError> {
        check_owner(peer_id, &key)?;
        self.write().entry(peer_id).or_default().public_key = Some(key);
        Ok(())
    }

    pub fn private_key(&self, peer_id: &PeerId) -> Option<Keypair> {
        self.read().get(peer_id).and_then(|r| r.keypair.clone())
    }

    pub fn public_key(&self, peer_id: &PeerId) -> Option<PublicKey> {
        self.read().get(peer_id).and_then(|r| r.public_key.clone())
    }

    /// Add `addr` for `peer_id`. A known address keeps whichever expiry is later.
    pub fn add_addr(&self, peer_id: PeerId, addr: Multiaddr, ttl: AddrTtl) {
        let expiry = ttl.expiry_from(Instant::now());
        let mut peers = self.write();
        let record = peers.entry(peer_id).or_default();

        match record.addrs.iter_mut().find(|(known, _)| *known == addr) {
            Some((_, current)) => *current = (*current).max(expiry),
            None => record.addrs.push((addr, expiry)),
        }
    }

    pub fn add_addrs(
        &self,
        peer_id: PeerId,
        addrs: impl IntoIterator<Item = Multiaddr>,
        ttl: AddrTtl,
    ) {
        for addr in addrs {
            self.add_addr(peer_id, addr, ttl);
        }
    }

    /// Live addresses for `peer_id`, in the order they were first added.
    pub fn addrs(&self, peer_id: &PeerId) -> Vec<Multiaddr> {
        let now = Instant::now();
        self.read()
            .get(peer_id)
            .map(|r| r.live_addrs(now))
            .unwrap_or_default()
    }

    pub fn peer_info(&self, peer_id: &PeerId) -> PeerInfo {
        PeerInfo {
            peer_id: *peer_id,
            addrs: self.addrs(peer_id),
        }
    }

    /// Every peer that has a record, including the local node.
    pub fn peers(&self) -> Vec<PeerId> {
        self.read().keys().copied().collect()
    }

    /// Drop expired addresses and remote records left without any address.
    pub fn gc(&self) {
        let now = Instant::now();
        let mut peers = self.write();
        for record in peers.values_mut() {
            record.addrs.retain(|(_, expiry)| expiry.is_live(now));
        }
        peers.retain(|_, record| !record.is_collectable());
    }
}

fn check_owner(expected: PeerId, key: &PublicKey) -> Result<(), DirectoryError> {
    let derived = key.to_peer_id();
    if derived != expected {
        return Err(DirectoryError::PeerIdMismatch { expected, derived });
    }
    Ok(())
}

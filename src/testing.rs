//! In-process stand-ins for the network host, for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use libp2p::identity::Keypair;
use libp2p::PeerId;

use crate::error::{RoutingError, TransportError};
use crate::host::Host;
use crate::peerstore::PeerInfo;
use crate::routing::{Routing, RoutingHandle, RoutingMode};

/// How the mock answers a dial to a given peer.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Succeed after the given delay.
    After(Duration),
    /// Fail immediately with a transport error.
    Refuse,
    /// Never answer.
    Never,
}

/// Something the mock saw, in the order it saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(PeerId),
    StartRouting(Vec<PeerId>),
}

pub struct MockHost {
    local_peer_id: PeerId,
    replies: HashMap<PeerId, Reply>,
    calls: Arc<Mutex<Vec<Call>>>,
    infos: Arc<Mutex<Vec<PeerInfo>>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            local_peer_id: Keypair::generate_ed25519().public().to_peer_id(),
            replies: HashMap::new(),
            calls: Arc::default(),
            infos: Arc::default(),
        }
    }

    pub fn with(mut self, peer_id: PeerId, reply: Reply) -> Self {
        self.replies.insert(peer_id, reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Peers passed to `connect`, in call order.
    pub fn dialed(&self) -> Vec<PeerId> {
        self.dialed_infos().into_iter().map(|i| i.peer_id).collect()
    }

    pub fn dialed_infos(&self) -> Vec<PeerInfo> {
        self.infos.lock().unwrap().clone()
    }
}

impl Host for MockHost {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    fn connect(
        &self,
        peer: PeerInfo,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.calls.lock().unwrap().push(Call::Connect(peer.peer_id));
        let reply = self.replies.get(&peer.peer_id).copied().unwrap_or(Reply::Refuse);
        self.infos.lock().unwrap().push(peer);

        async move {
            match reply {
                Reply::After(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                Reply::Refuse => Err(TransportError("refused".into())),
                Reply::Never => std::future::pending().await,
            }
        }
        .boxed()
    }
}

impl Routing for MockHost {
    fn start_routing(
        &self,
        seeds: Vec<PeerInfo>,
    ) -> BoxFuture<'_, Result<RoutingHandle, RoutingError>> {
        let seeded: Vec<PeerId> = seeds.iter().map(|s| s.peer_id).collect();
        self.calls.lock().unwrap().push(Call::StartRouting(seeded.clone()));

        let handle = RoutingHandle {
            local_peer_id: self.local_peer_id,
            mode: RoutingMode::Server,
            seeded_peers: seeded.len(),
        };
        async move { Ok(handle) }.boxed()
    }
}

//! Network host: the libp2p swarm and the command loop that drives it.
//!
//! [`SwarmHost`] owns the swarm and runs on its own task. Everything else
//! talks to it through a cloneable [`HostHandle`]. The loop exits once every
//! handle has been dropped.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use libp2p::core::connection::ConnectedPoint;
use libp2p::metrics::Registry;
use libp2p::swarm::{dial_opts::DialOpts, ConnectionId, Swarm, SwarmEvent};
use libp2p::{identify, kad, Multiaddr, PeerId};
use net::{BehaviourConfig, NodeBehaviour, NodeBehaviourEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::{HostError, ListenAddressError, RoutingError, TransportError};
use crate::keys::NodeIdentity;
use crate::peerstore::{AddrTtl, PeerInfo, Peerstore};
use crate::routing::{Routing, RoutingConfig, RoutingHandle, RoutingMode};

/// How often the host sweeps expired addresses out of the peerstore.
pub const PEERSTORE_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Dials peers on behalf of the bootstrap logic.
pub trait Host: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    /// Connect to `peer` using any of its addresses. Resolves once a
    /// connection exists or the dial has failed.
    ///
    /// The dial is aborted once `timeout` has passed and nobody else is
    /// waiting on it; a connection that completes afterwards is closed.
    fn connect(
        &self,
        peer: PeerInfo,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Commands sent from handles to the swarm event loop.
pub enum SwarmCommand {
    Connect {
        peer: PeerInfo,
        deadline: Instant,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    StartRouting {
        seeds: Vec<PeerInfo>,
        reply: oneshot::Sender<RoutingHandle>,
    },
    /// OpenMetrics text for the transport bandwidth counters.
    Metrics { reply: oneshot::Sender<String> },
}

type ConnectReply = oneshot::Sender<Result<(), TransportError>>;

// One outgoing dial and everyone waiting on it.
struct PendingDial {
    connection_id: ConnectionId,
    waiters: Vec<(Instant, ConnectReply)>,
}

impl PendingDial {
    fn next_deadline(&self) -> Option<Instant> {
        self.waiters.iter().map(|(deadline, _)| *deadline).min()
    }
}

pub struct SwarmHost {
    swarm: Swarm<NodeBehaviour>,
    local_peer_id: PeerId,
    peerstore: Peerstore,
    routing_mode: RoutingMode,
    metrics: Registry,
    cmd_rx: mpsc::Receiver<SwarmCommand>,
    listen_tx: watch::Sender<Vec<Multiaddr>>,
    pending_dials: HashMap<PeerId, PendingDial>,
    // Dials given up on whose outcome the swarm has not reported yet.
    abandoned_dials: HashSet<ConnectionId>,
}

impl SwarmHost {
    /// Build the swarm for `identity` and start listening on `listen`.
    ///
    /// Identify results are written into `peerstore` as they arrive.
    pub fn new(
        identity: &NodeIdentity,
        listen: &str,
        peerstore: Peerstore,
        routing: &RoutingConfig,
    ) -> Result<(Self, HostHandle), HostError> {
        let listen_addr: Multiaddr = listen.parse().map_err(|source| ListenAddressError {
            addr: listen.to_string(),
            source,
        })?;

        let behaviour_config = BehaviourConfig {
            max_records: routing.max_records,
            ..Default::default()
        };
        let mut metrics = Registry::default();
        let mut swarm =
            net::build_swarm(identity.keypair().clone(), &behaviour_config, &mut metrics)
                .map_err(|e| HostError::Construction(format!("{e:#}")))?;

        swarm
            .listen_on(listen_addr.clone())
            .map_err(|e| HostError::Construction(format!("listen on {listen_addr}: {e}")))?;

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (listen_tx, listen_rx) = watch::channel(Vec::new());
        let local_peer_id = identity.peer_id();

        let host = Self {
            swarm,
            local_peer_id,
            peerstore,
            routing_mode: routing.mode,
            metrics,
            cmd_rx,
            listen_tx,
            pending_dials: HashMap::new(),
            abandoned_dials: HashSet::new(),
        };
        let handle = HostHandle {
            local_peer_id,
            cmd_tx,
            listen_rx,
        };
        Ok((host, handle))
    }

    /// Drive the swarm until every [`HostHandle`] is dropped.
    pub async fn run(mut self) {
        let mut gc = tokio::time::interval(PEERSTORE_GC_INTERVAL);
        gc.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_deadline = self.next_dial_deadline();
            tokio::select! {
                event = self.swarm.select_next_some() => self.on_swarm_event(event),
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                _ = sleep_until(next_deadline) => self.expire_dials(),
                _ = gc.tick() => self.peerstore.gc(),
            }
        }
        debug!(peer_id = %self.local_peer_id, "Swarm event loop stopped");
    }

    fn on_command(&mut self, cmd: SwarmCommand) {
        match cmd {
            SwarmCommand::Connect {
                peer,
                deadline,
                reply,
            } => self.connect(peer, deadline, reply),
            SwarmCommand::StartRouting { seeds, reply } => {
                let _ = reply.send(self.start_routing(seeds));
            }
            SwarmCommand::Metrics { reply } => {
                let mut text = String::new();
                if let Err(e) = prometheus_client::encoding::text::encode(&mut text, &self.metrics) {
                    warn!(error = %e, "Failed to encode metrics");
                }
                let _ = reply.send(text);
            }
        }
    }

    fn connect(&mut self, peer: PeerInfo, deadline: Instant, reply: ConnectReply) {
        let PeerInfo { peer_id, addrs } = peer;

        if self.swarm.is_connected(&peer_id) {
            let _ = reply.send(Ok(()));
            return;
        }
        if let Some(pending) = self.pending_dials.get_mut(&peer_id) {
            pending.waiters.retain(|(_, waiter)| !waiter.is_closed());
            pending.waiters.push((deadline, reply));
            return;
        }
        if addrs.is_empty() {
            let _ = reply.send(Err(TransportError(format!("no known addresses for {peer_id}"))));
            return;
        }

        let opts = DialOpts::peer_id(peer_id).addresses(addrs).build();
        let connection_id = opts.connection_id();
        match self.swarm.dial(opts) {
            Ok(()) => {
                self.pending_dials.insert(
                    peer_id,
                    PendingDial {
                        connection_id,
                        waiters: vec![(deadline, reply)],
                    },
                );
            }
            Err(e) => {
                let _ = reply.send(Err(TransportError(e.to_string())));
            }
        }
    }

    fn next_dial_deadline(&self) -> Option<Instant> {
        self.pending_dials
            .values()
            .filter_map(PendingDial::next_deadline)
            .min()
    }

    /// Fail waiters whose deadline has passed and abort dials nobody waits on.
    fn expire_dials(&mut self) {
        let now = Instant::now();
        let mut abandoned = Vec::new();

        for (peer_id, pending) in self.pending_dials.iter_mut() {
            let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut pending.waiters)
                .into_iter()
                .partition(|(deadline, _)| *deadline <= now);
            for (_, waiter) in expired {
                let _ = waiter.send(Err(TransportError(format!("dial to {peer_id} timed out"))));
            }
            pending.waiters = waiting
                .into_iter()
                .filter(|(_, waiter)| !waiter.is_closed())
                .collect();
            if pending.waiters.is_empty() {
                abandoned.push(*peer_id);
            }
        }

        for peer_id in abandoned {
            if let Some(pending) = self.pending_dials.remove(&peer_id) {
                debug!(peer_id = %peer_id, "Dial deadline passed, aborting dial");
                self.abandoned_dials.insert(pending.connection_id);
                let _ = self.swarm.disconnect_peer_id(peer_id);
            }
        }
    }

    fn start_routing(&mut self, seeds: Vec<PeerInfo>) -> RoutingHandle {
        let kad = &mut self.swarm.behaviour_mut().kad;

        let mut seeded_peers = 0;
        for seed in seeds.iter().filter(|s| !s.addrs.is_empty()) {
            for addr in &seed.addrs {
                kad.add_address(&seed.peer_id, addr.clone());
            }
            seeded_peers += 1;
        }

        kad.set_mode(Some(self.routing_mode.into()));
        if seeded_peers > 0 {
            if let Err(e) = kad.bootstrap() {
                warn!(error = %e, "DHT bootstrap query not started");
            }
        }

        info!(
            mode = %self.routing_mode,
            seeded_peers,
            "Routing started"
        );
        RoutingHandle {
            local_peer_id: self.local_peer_id,
            mode: self.routing_mode,
            seeded_peers,
        }
    }

    fn on_swarm_event(&mut self, event: SwarmEvent<NodeBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(address = %address, "Listening on address");
                self.listen_tx.send_modify(|addrs| addrs.push(address));
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                debug!(address = %address, "Listen address expired");
                self.listen_tx.send_modify(|addrs| addrs.retain(|a| *a != address));
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                ..
            } => {
                if self.abandoned_dials.remove(&connection_id) {
                    debug!(peer_id = %peer_id, "Closing connection from an abandoned dial");
                    self.swarm.close_connection(connection_id);
                    return;
                }
                debug!(peer_id = %peer_id, "Connection established");
                if let ConnectedPoint::Dialer { address, .. } = endpoint {
                    self.peerstore
                        .add_addr(peer_id, address, AddrTtl::RecentlyConnected);
                }
                if let Some(pending) = self.pending_dials.remove(&peer_id) {
                    for (_, waiter) in pending.waiters {
                        let _ = waiter.send(Ok(()));
                    }
                }
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                debug!(peer_id = %peer_id, "Connection closed");
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
            } => {
                if self.abandoned_dials.remove(&connection_id) {
                    trace!(error = %error, "Abandoned dial finished");
                    return;
                }
                let Some(peer_id) = peer_id else { return };
                debug!(peer_id = %peer_id, error = %error, "Outgoing connection failed");
                if self
                    .pending_dials
                    .get(&peer_id)
                    .is_some_and(|p| p.connection_id == connection_id)
                {
                    if let Some(pending) = self.pending_dials.remove(&peer_id) {
                        for (_, waiter) in pending.waiters {
                            let _ = waiter.send(Err(TransportError(error.to_string())));
                        }
                    }
                }
            }
            SwarmEvent::Behaviour(NodeBehaviourEvent::Identify(event)) => self.on_identify(event),
            SwarmEvent::Behaviour(NodeBehaviourEvent::Kad(event)) => on_kad(event),
            SwarmEvent::Behaviour(NodeBehaviourEvent::Ping(event)) => {
                trace!(peer_id = %event.peer, result = ?event.result, "Ping");
            }
            _ => {}
        }
    }

    fn on_identify(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                debug!(peer_id = %peer_id, listen_addrs = ?info.listen_addrs, "Received identify info from peer");
                if let Err(e) = self.peerstore.add_public_key(peer_id, info.public_key) {
                    warn!(peer_id = %peer_id, error = %e, "Peer identified with a foreign key");
                    return;
                }
                self.peerstore
                    .add_addrs(peer_id, info.listen_addrs, AddrTtl::RecentlyConnected);
            }
            identify::Event::Error { peer_id, error, .. } => {
                debug!(peer_id = %peer_id, error = %error, "Identify error with peer");
            }
            _ => {}
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn on_kad(event: kad::Event) {
    match event {
        kad::Event::OutboundQueryProgressed {
            result: kad::QueryResult::Bootstrap(result),
            ..
        } => match result {
            Ok(ok) => debug!(
                peer_id = %ok.peer,
                remaining = ok.num_remaining,
                "DHT bootstrap progressed"
            ),
            Err(e) => warn!(error = ?e, "DHT bootstrap failed"),
        },
        kad::Event::RoutingUpdated { peer, .. } => {
            debug!(peer_id = %peer, "Routing table updated");
        }
        kad::Event::ModeChanged { new_mode } => {
            info!(mode = %new_mode, "DHT mode changed");
        }
        _ => {}
    }
}

/// Cheap, cloneable access to a running [`SwarmHost`].
#[derive(Clone)]
pub struct HostHandle {
    local_peer_id: PeerId,
    cmd_tx: mpsc::Sender<SwarmCommand>,
    listen_rx: watch::Receiver<Vec<Multiaddr>>,
}

impl HostHandle {
    /// Wait until the swarm has bound at least one listen address.
    ///
    /// Returns `None` if the host stopped first.
    pub async fn listen_addrs(&self) -> Option<Vec<Multiaddr>> {
        let mut rx = self.listen_rx.clone();
        let addrs = rx.wait_for(|addrs| !addrs.is_empty()).await.ok()?;
        Some(addrs.clone())
    }

    /// Transport bandwidth counters in OpenMetrics text format.
    ///
    /// Returns `None` if the host has stopped.
    pub async fn metrics(&self) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(SwarmCommand::Metrics { reply }).await.ok()?;
        rx.await.ok()
    }
}

impl Host for HostHandle {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    fn connect(
        &self,
        peer: PeerInfo,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            let stopped = || TransportError("network host is no longer running".into());
            let deadline = Instant::now() + timeout;
            let (reply, rx) = oneshot::channel();
            self.cmd_tx
                .send(SwarmCommand::Connect {
                    peer,
                    deadline,
                    reply,
                })
                .await
                .map_err(|_| stopped())?;
            rx.await.map_err(|_| stopped())?
        }
        .boxed()
    }
}

impl Routing for HostHandle {
    fn start_routing(
        &self,
        seeds: Vec<PeerInfo>,
    ) -> BoxFuture<'_, Result<RoutingHandle, RoutingError>> {
        async move {
            let (reply, rx) = oneshot::channel();
            self.cmd_tx
                .send(SwarmCommand::StartRouting { seeds, reply })
                .await
                .map_err(|_| RoutingError::HostStopped)?;
            rx.await.map_err(|_| RoutingError::HostStopped)
        }
        .boxed()
    }
}

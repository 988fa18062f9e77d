//! Handoff to the DHT once the bootstrap dials are done.

use std::fmt;

use futures::future::BoxFuture;
use libp2p::{kad, PeerId};

use crate::error::RoutingError;
use crate::peerstore::PeerInfo;

pub const DEFAULT_MAX_RECORDS: usize = 1024;

/// Whether the node answers DHT queries or only issues them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingMode {
    #[default]
    Server,
    Client,
}

impl std::str::FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server" => Ok(RoutingMode::Server),
            "client" => Ok(RoutingMode::Client),
            _ => Err(format!("Invalid routing mode: {s}. Must be one of: server, client")),
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Server => write!(f, "server"),
            RoutingMode::Client => write!(f, "client"),
        }
    }
}

impl From<RoutingMode> for kad::Mode {
    fn from(mode: RoutingMode) -> Self {
        match mode {
            RoutingMode::Server => kad::Mode::Server,
            RoutingMode::Client => kad::Mode::Client,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
    /// Capacity of the in-memory record store behind the DHT.
    pub max_records: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::default(),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// A running routing node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingHandle {
    pub local_peer_id: PeerId,
    pub mode: RoutingMode,
    /// Peers written to the routing table at start.
    pub seeded_peers: usize,
}

/// Starts the DHT on top of a network host.
pub trait Routing: Send + Sync {
    /// Activate routing, seeding the table with `seeds`. An empty seed list
    /// still starts the node; it just has nobody to ask yet.
    fn start_routing(
        &self,
        seeds: Vec<PeerInfo>,
    ) -> BoxFuture<'_, Result<RoutingHandle, RoutingError>>;
}

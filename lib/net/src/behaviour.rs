use std::time::Duration;

use libp2p::{
    identify, identity, kad,
    kad::store::{MemoryStore, MemoryStoreConfig},
    ping,
    swarm::{self, StreamProtocol},
};

use crate::{DEFAULT_IDLE_CONNECTION_TIMEOUT, IPFS_IDENTIFY_PROTOCOL, IPFS_KADEMLIA_PROTOCOL};

/// Knobs for the behaviour stack.
#[derive(Debug, Clone)]
pub struct BehaviourConfig {
    /// Capacity of the in-memory record store backing the DHT.
    pub max_records: usize,
    /// Agent string advertised through identify.
    pub agent_version: String,
    pub idle_connection_timeout: Duration,
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            max_records: MemoryStoreConfig::default().max_records,
            agent_version: format!("dhtnode/{}", env!("CARGO_PKG_VERSION")),
            idle_connection_timeout: DEFAULT_IDLE_CONNECTION_TIMEOUT,
        }
    }
}

#[derive(swarm::NetworkBehaviour)]
#[behaviour(to_swarm = "NodeBehaviourEvent")]
pub struct NodeBehaviour {
    pub kad: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

impl NodeBehaviour {
    /// Assemble the behaviour for `keypair`.
    ///
    /// Kademlia starts dormant: client mode and no periodic bootstrap. The
    /// owner switches it on once the bootstrap dials are done.
    pub fn new(keypair: &identity::Keypair, cfg: &BehaviourConfig) -> Self {
        let peer_id = keypair.public().to_peer_id();

        let mut kad_config = kad::Config::new(StreamProtocol::new(IPFS_KADEMLIA_PROTOCOL));
        kad_config.set_periodic_bootstrap_interval(None);

        let store = MemoryStore::with_config(
            peer_id,
            MemoryStoreConfig {
                max_records: cfg.max_records,
                ..Default::default()
            },
        );

        let mut kad = kad::Behaviour::with_config(peer_id, store, kad_config);
        kad.set_mode(Some(kad::Mode::Client));

        Self {
            kad,
            identify: identify::Behaviour::new(
                identify::Config::new(IPFS_IDENTIFY_PROTOCOL.to_string(), keypair.public())
                    .with_agent_version(cfg.agent_version.clone()),
            ),
            ping: ping::Behaviour::new(ping::Config::new()),
        }
    }
}

// Events explicitly managed or intercepted by the NodeBehaviour.
#[derive(Debug)]
pub enum NodeBehaviourEvent {
    Kad(kad::Event),
    Identify(identify::Event),
    Ping(ping::Event),
}

impl From<kad::Event> for NodeBehaviourEvent {
    fn from(event: kad::Event) -> Self {
        NodeBehaviourEvent::Kad(event)
    }
}

impl From<identify::Event> for NodeBehaviourEvent {
    fn from(event: identify::Event) -> Self {
        NodeBehaviourEvent::Identify(event)
    }
}

impl From<ping::Event> for NodeBehaviourEvent {
    fn from(event: ping::Event) -> Self {
        NodeBehaviourEvent::Ping(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kad_starts_in_client_mode() {
        let keypair = identity::Keypair::generate_ed25519();
        let behaviour = NodeBehaviour::new(&keypair, &BehaviourConfig::default());
        assert_eq!(behaviour.kad.mode(), kad::Mode::Client);
    }

    #[test]
    fn test_default_agent_version() {
        let cfg = BehaviourConfig::default();
        assert!(cfg.agent_version.starts_with("dhtnode/"));
        assert!(cfg.max_records > 0);
    }
}

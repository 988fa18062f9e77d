pub mod behaviour;

use std::time::Duration;

use anyhow::Result;
use libp2p::{identity, metrics::Registry, swarm::Swarm, SwarmBuilder};

pub use behaviour::{BehaviourConfig, NodeBehaviour, NodeBehaviourEvent};

// IPFS protocol names, so the node can join the public DHT.
pub const IPFS_KADEMLIA_PROTOCOL: &str = "/ipfs/kad/1.0.0";
pub const IPFS_IDENTIFY_PROTOCOL: &str = "/ipfs/id/1.0.0";

/// Build a TCP/noise/yamux swarm around a [`NodeBehaviour`].
///
/// Transport bandwidth counters are registered in `metrics`. The swarm is
/// not listening yet; callers decide where to bind.
pub fn build_swarm(
    keypair: identity::Keypair,
    cfg: &BehaviourConfig,
    metrics: &mut Registry,
) -> Result<Swarm<NodeBehaviour>> {
    let behaviour = NodeBehaviour::new(&keypair, cfg);

    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            Default::default(),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )?
        .with_bandwidth_metrics(metrics)
        .with_behaviour(|_| behaviour)?
        .with_swarm_config(|c| c.with_idle_connection_timeout(cfg.idle_connection_timeout))
        .build();

    tracing::debug!(peer_id = %swarm.local_peer_id(), "Built libp2p swarm");
    Ok(swarm)
}

/// Idle timeout used when the caller has no preference.
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

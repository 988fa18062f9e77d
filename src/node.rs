//! Node startup sequence.
//!
//! identity -> self entry in the peerstore -> listening host -> bootstrap
//! dials -> routing. Routing starts only after every dial has an outcome.

use std::future::Future;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::bootstrap::{
    connect_to_bootstrap_peers, BootstrapAddress, BootstrapList, BootstrapOptions, BootstrapReport,
};
use crate::config::NodeConfig;
use crate::host::{Host, SwarmHost};
use crate::keys::{self, NodeIdentity};
use crate::peerstore::Peerstore;
use crate::routing::{Routing, RoutingHandle};

/// Result of joining the overlay.
#[derive(Debug)]
pub struct Joined {
    pub report: BootstrapReport,
    pub routing: RoutingHandle,
}

/// Register the local identity, dial the bootstrap peers and start routing.
///
/// Routing is started even when no dial succeeded; the peers that were
/// reached seed its table.
pub async fn join<H>(
    identity: &NodeIdentity,
    peerstore: &Peerstore,
    host: &H,
    addresses: &[BootstrapAddress],
    options: &BootstrapOptions,
) -> Result<Joined>
where
    H: Host + Routing + ?Sized,
{
    peerstore
        .register_self(identity)
        .context("register local identity")?;

    let report = connect_to_bootstrap_peers(addresses, peerstore, host, options).await;
    if !addresses.is_empty() && report.succeeded() == 0 {
        warn!("No bootstrap peer reachable, starting routing without seeds");
    }

    let seeds = report
        .connected_peers()
        .iter()
        .map(|peer_id| peerstore.peer_info(peer_id))
        .collect();
    let routing = host.start_routing(seeds).await.context("start routing")?;

    Ok(Joined { report, routing })
}

/// Start a node from `config` and keep it running until `shutdown` resolves.
pub async fn run<F>(config: NodeConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let identity = keys::establish_identity(config.key_file.as_deref(), config.key_algorithm)
        .context("establish node identity")?;
    info!(peer_id = %identity.peer_id(), "Using peer id");

    let bootstrap = match &config.bootstrap_file {
        Some(path) => BootstrapList::load(path)?,
        None => BootstrapList::default(),
    };
    if !bootstrap.is_empty() {
        info!(count = bootstrap.len(), "Bootstrapping to:");
        for addr in bootstrap.addrs() {
            info!("  - {addr}");
        }
    }

    let peerstore = Peerstore::new();
    let (host, handle) = SwarmHost::new(&identity, &config.listen, peerstore.clone(), &config.routing)
        .context("start network host")?;
    info!(listen = %config.listen, "Listening on");
    let swarm_task = tokio::spawn(host.run());

    let joined = join(
        &identity,
        &peerstore,
        &handle,
        bootstrap.addrs(),
        &config.bootstrap,
    )
    .await?;
    info!(
        peer_id = %joined.routing.local_peer_id,
        connected = joined.report.succeeded(),
        failed = joined.report.failed(),
        mode = %joined.routing.mode,
        "Node joined the overlay"
    );

    shutdown.await;
    info!("Shutting down");

    if let Some(metrics) = handle.metrics().await {
        debug!(%metrics, "Transport bandwidth at shutdown");
    }
    drop(handle);
    swarm_task.await.context("swarm task panicked")?;
    Ok(())
}

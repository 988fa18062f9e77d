use std::time::Duration;

use futures::{stream, StreamExt};
use libp2p::{Multiaddr, PeerId};
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

use crate::bootstrap::BootstrapAddress;
use crate::error::AttemptError;
use crate::host::Host;
use crate::peerstore::{AddrTtl, Peerstore};

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONCURRENT_DIALS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Deadline for each individual dial.
    pub dial_timeout: Duration,
    /// Number of dials in flight at once. `1` dials strictly in sequence.
    pub max_concurrent_dials: usize,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            max_concurrent_dials: DEFAULT_MAX_CONCURRENT_DIALS,
        }
    }
}

/// Outcome of dialing one bootstrap address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub address: Multiaddr,
    /// `None` when the address carried no usable peer id.
    pub peer_id: Option<PeerId>,
    pub outcome: Result<(), AttemptError>,
    pub elapsed: Duration,
}

impl ConnectionAttempt {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Every attempt made during one bootstrap pass, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub attempts: Vec<ConnectionAttempt>,
}

impl BootstrapReport {
    pub fn succeeded(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.len() - self.succeeded()
    }

    /// Peers reached at least once, without duplicates, in input order.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = Vec::new();
        for peer_id in self
            .attempts
            .iter()
            .filter(|a| a.is_success())
            .filter_map(|a| a.peer_id)
        {
            if !peers.contains(&peer_id) {
                peers.push(peer_id);
            }
        }
        peers
    }
}

/// Dial every bootstrap address once.
///
/// Each address is registered in `peerstore` with a permanent TTL and then
/// dialed under its own deadline. Failures are logged and recorded; they never
/// stop the remaining dials. The returned report has exactly one attempt per
/// input address, in input order, whatever order the dials finished in.
pub async fn connect_to_bootstrap_peers<H>(
    addresses: &[BootstrapAddress],
    peerstore: &Peerstore,
    host: &H,
    options: &BootstrapOptions,
) -> BootstrapReport
where
    H: Host + ?Sized,
{
    let span = tracing::info_span!(
        "bootstrap",
        local_peer_id = %host.local_peer_id(),
        peer_count = addresses.len()
    );

    async move {
        if addresses.is_empty() {
            info!("No bootstrap peers configured");
            return BootstrapReport::default();
        }

        let limit = options.max_concurrent_dials.max(1);
        let attempts = stream::iter(addresses)
            .map(|address| attempt(address, peerstore, host, options.dial_timeout))
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

        let report = BootstrapReport { attempts };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Bootstrap dials finished"
        );
        report
    }
    .instrument(span)
    .await
}

async fn attempt<H>(
    address: &BootstrapAddress,
    peerstore: &Peerstore,
    host: &H,
    timeout: Duration,
) -> ConnectionAttempt
where
    H: Host + ?Sized,
{
    let started = Instant::now();

    let (peer_id, transport) = match address.decompose() {
        Ok(parts) => parts,
        Err(e) => {
            warn!(address = %address, error = %e, "Error parsing bootstrap address");
            return ConnectionAttempt {
                address: address.multiaddr().clone(),
                peer_id: None,
                outcome: Err(e.into()),
                elapsed: started.elapsed(),
            };
        }
    };

    peerstore.add_addr(peer_id, transport, AddrTtl::Permanent);
    let info = peerstore.peer_info(&peer_id);

    let result = tokio::time::timeout(timeout, host.connect(info, timeout)).await;
    let elapsed = started.elapsed();

    // Reaching the deadline counts as a timeout even if the dial resolved on
    // the same tick.
    let outcome = match result {
        _ if elapsed >= timeout => Err(AttemptError::Timeout(timeout)),
        Err(_) => Err(AttemptError::Timeout(timeout)),
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(AttemptError::Transport(e)),
    };

    match &outcome {
        Ok(()) => info!(
            peer_id = %peer_id,
            elapsed_ms = elapsed.as_millis(),
            "Dial to bootstrap peer succeeded"
        ),
        Err(e) => warn!(
            peer_id = %peer_id,
            address = %address,
            error = %e,
            "Error connecting to bootstrap peer"
        ),
    }

    ConnectionAttempt {
        address: address.multiaddr().clone(),
        peer_id: Some(peer_id),
        outcome,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::BootstrapList;
    use crate::error::TransportError;
    use crate::testing::{MockHost, Reply};
    use libp2p::identity::Keypair;

    fn peer() -> PeerId {
        Keypair::generate_ed25519().public().to_peer_id()
    }

    fn list(lines: &[String]) -> BootstrapList {
        BootstrapList::from_text(&lines.join("\n"))
    }

    fn line(ip: &str, peer_id: PeerId) -> String {
        format!("/ip4/{ip}/tcp/4001/p2p/{peer_id}")
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_and_silent_peer() {
        let (a, b) = (peer(), peer());
        let host = MockHost::new()
            .with(a, Reply::After(Duration::from_secs(1)))
            .with(b, Reply::Never);
        let peers = BootstrapList::from_text(&format!(
            "{}\n\n{}",
            line("10.0.0.1", a),
            line("10.0.0.2", b)
        ));

        let report = connect_to_bootstrap_peers(
            peers.addrs(),
            &Peerstore::new(),
            &host,
            &BootstrapOptions::default(),
        )
        .await;

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].peer_id, Some(a));
        assert_eq!(report.attempts[0].outcome, Ok(()));
        assert_eq!(report.attempts[1].peer_id, Some(b));
        assert_eq!(
            report.attempts[1].outcome,
            Err(AttemptError::Timeout(DEFAULT_DIAL_TIMEOUT))
        );
        assert_eq!(report.connected_peers(), vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_address_gets_one_outcome() {
        let reachable: Vec<_> = (0..4).map(|_| peer()).collect();
        let refused: Vec<_> = (0..2).map(|_| peer()).collect();
        let silent: Vec<_> = (0..3).map(|_| peer()).collect();

        let mut host = MockHost::new();
        for p in &reachable {
            host = host.with(*p, Reply::After(Duration::from_millis(200)));
        }
        for p in &refused {
            host = host.with(*p, Reply::Refuse);
        }
        for p in &silent {
            host = host.with(*p, Reply::Never);
        }

        let lines: Vec<_> = reachable
            .iter()
            .chain(&refused)
            .chain(&silent)
            .map(|p| line("10.0.0.1", *p))
            .collect();
        let peers = list(&lines);

        let report = connect_to_bootstrap_peers(
            peers.addrs(),
            &Peerstore::new(),
            &host,
            &BootstrapOptions::default(),
        )
        .await;

        assert_eq!(report.attempts.len(), 9);
        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed(), 5);

        let transport_failures = report
            .attempts
            .iter()
            .filter(|a| matches!(a.outcome, Err(AttemptError::Transport(_))))
            .count();
        assert_eq!(transport_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_peer_id_is_a_resolution_failure() {
        let a = peer();
        let host = MockHost::new().with(a, Reply::After(Duration::ZERO));
        let peers = list(&["/ip4/10.0.0.9/tcp/4001".to_string(), line("10.0.0.1", a)]);

        let report = connect_to_bootstrap_peers(
            peers.addrs(),
            &Peerstore::new(),
            &host,
            &BootstrapOptions::default(),
        )
        .await;

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].peer_id, None);
        assert!(matches!(
            report.attempts[0].outcome,
            Err(AttemptError::Resolution(_))
        ));
        assert!(report.attempts[1].is_success());
        assert_eq!(host.dialed(), vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_boundary() {
        let timeout = Duration::from_secs(10);
        let (at, before) = (peer(), peer());
        let host = MockHost::new()
            .with(at, Reply::After(timeout))
            .with(before, Reply::After(timeout - Duration::from_millis(1)));
        let peers = list(&[line("10.0.0.1", at), line("10.0.0.2", before)]);
        let options = BootstrapOptions {
            dial_timeout: timeout,
            max_concurrent_dials: 2,
        };

        let report =
            connect_to_bootstrap_peers(peers.addrs(), &Peerstore::new(), &host, &options).await;

        assert_eq!(report.attempts[0].outcome, Err(AttemptError::Timeout(timeout)));
        assert_eq!(report.attempts[1].outcome, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_permanent_address_before_dialing() {
        let a = peer();
        let host = MockHost::new().with(a, Reply::Refuse);
        let store = Peerstore::new();
        let peers = list(&[line("10.0.0.1", a)]);

        let report =
            connect_to_bootstrap_peers(peers.addrs(), &store, &host, &BootstrapOptions::default())
                .await;
        assert_eq!(
            report.attempts[0].outcome,
            Err(AttemptError::Transport(TransportError("refused".into())))
        );

        let expected: Multiaddr = "/ip4/10.0.0.1/tcp/4001".parse().unwrap();
        assert_eq!(host.dialed_infos()[0].addrs, vec![expected.clone()]);

        tokio::time::advance(Duration::from_secs(30 * 24 * 60 * 60)).await;
        assert_eq!(store.addrs(&a), vec![expected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_uses_every_known_address() {
        let a = peer();
        let host = MockHost::new().with(a, Reply::After(Duration::ZERO));
        let store = Peerstore::new();
        let known: Multiaddr = "/ip4/192.168.1.5/tcp/4001".parse().unwrap();
        store.add_addr(a, known.clone(), AddrTtl::Standard);

        let peers = list(&[line("10.0.0.1", a)]);
        connect_to_bootstrap_peers(peers.addrs(), &store, &host, &BootstrapOptions::default())
            .await;

        let dialed = &host.dialed_infos()[0];
        assert_eq!(dialed.addrs.len(), 2);
        assert!(dialed.addrs.contains(&known));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_dials_share_the_deadline_window() {
        let silent: Vec<_> = (0..3).map(|_| peer()).collect();
        let mut host = MockHost::new();
        for p in &silent {
            host = host.with(*p, Reply::Never);
        }
        let lines: Vec<_> = silent.iter().map(|p| line("10.0.0.1", *p)).collect();
        let peers = list(&lines);

        let started = Instant::now();
        let report = connect_to_bootstrap_peers(
            peers.addrs(),
            &Peerstore::new(),
            &host,
            &BootstrapOptions::default(),
        )
        .await;
        assert_eq!(report.failed(), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_DIAL_TIMEOUT);
        assert!(elapsed < DEFAULT_DIAL_TIMEOUT + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_dials() {
        let silent: Vec<_> = (0..3).map(|_| peer()).collect();
        let mut host = MockHost::new();
        for p in &silent {
            host = host.with(*p, Reply::Never);
        }
        let lines: Vec<_> = silent.iter().map(|p| line("10.0.0.1", *p)).collect();
        let peers = list(&lines);
        let options = BootstrapOptions {
            max_concurrent_dials: 0,
            ..Default::default()
        };

        let started = Instant::now();
        let report =
            connect_to_bootstrap_peers(peers.addrs(), &Peerstore::new(), &host, &options).await;
        assert_eq!(report.failed(), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_DIAL_TIMEOUT * 3);
        assert!(elapsed < DEFAULT_DIAL_TIMEOUT * 4);
        assert_eq!(host.dialed(), silent);
    }

    #[tokio::test]
    async fn test_empty_list_makes_no_attempts() {
        let host = MockHost::new();
        let report =
            connect_to_bootstrap_peers(&[], &Peerstore::new(), &host, &BootstrapOptions::default())
                .await;
        assert!(report.attempts.is_empty());
        assert!(host.dialed().is_empty());
    }

    #[test]
    fn test_connected_peers_are_deduplicated() {
        let a = peer();
        let address: Multiaddr = line("10.0.0.1", a).parse().unwrap();
        let ok = ConnectionAttempt {
            address,
            peer_id: Some(a),
            outcome: Ok(()),
            elapsed: Duration::ZERO,
        };
        let report = BootstrapReport {
            attempts: vec![ok.clone(), ok],
        };
        assert_eq!(report.connected_peers(), vec![a]);
        assert_eq!(report.succeeded(), 2);
    }
}

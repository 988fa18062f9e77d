use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use tracing::{debug, warn};

use crate::error::{AddressResolutionError, BootstrapAddressParseError};

/// One configured bootstrap peer address, e.g.
/// `/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAddress {
    raw: String,
    addr: Multiaddr,
}

impl BootstrapAddress {
    pub fn multiaddr(&self) -> &Multiaddr {
        &self.addr
    }

    /// Split into the remote peer id and the transport part that precedes it.
    pub fn decompose(&self) -> Result<(PeerId, Multiaddr), AddressResolutionError> {
        let mut transport = self.addr.clone();
        let peer_id = match transport.pop() {
            Some(Protocol::P2p(peer_id)) => peer_id,
            _ => return Err(AddressResolutionError::MissingPeerId(self.addr.clone())),
        };
        if transport.is_empty() {
            return Err(AddressResolutionError::MissingTransport(self.addr.clone()));
        }
        Ok((peer_id, transport))
    }
}

impl From<Multiaddr> for BootstrapAddress {
    fn from(addr: Multiaddr) -> Self {
        Self {
            raw: addr.to_string(),
            addr,
        }
    }
}

/// Shows the address as it was written in the bootstrap file.
impl fmt::Display for BootstrapAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse newline-separated bootstrap addresses.
///
/// Lines without a `/` are not addresses and are skipped silently. Every
/// other line produces exactly one entry, in input order.
pub fn parse_bootstrap_list(
    content: &str,
) -> Vec<Result<BootstrapAddress, BootstrapAddressParseError>> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if !line.contains('/') {
                return None;
            }
            let parsed = line
                .parse::<Multiaddr>()
                .map(|addr| BootstrapAddress {
                    raw: line.to_string(),
                    addr,
                })
                .map_err(|source| BootstrapAddressParseError {
                    line: index + 1,
                    raw: line.to_string(),
                    source,
                });
            Some(parsed)
        })
        .collect()
}

/// Ordered list of bootstrap addresses that parsed successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapList {
    addrs: Vec<BootstrapAddress>,
}

impl BootstrapList {
    /// Parse `content`, logging and dropping lines that are not valid multiaddrs.
    pub fn from_text(content: &str) -> Self {
        let mut addrs = Vec::new();
        for entry in parse_bootstrap_list(content) {
            match entry {
                Ok(addr) => addrs.push(addr),
                Err(e) => {
                    warn!(line = e.line, raw = %e.raw, error = %e.source, "Skipping bootstrap address")
                }
            }
        }
        debug!(count = addrs.len(), "Parsed bootstrap list");
        Self { addrs }
    }

    /// Read and parse a UTF-8 bootstrap file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read bootstrap file: {}", path.display()))?;
        Ok(Self::from_text(&content))
    }

    pub fn addrs(&self) -> &[BootstrapAddress] {
        &self.addrs
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }
}

//! Error types for node startup and bootstrap.
//!
//! Identity, listen-address and host-construction errors are fatal to
//! startup. Everything raised per bootstrap line or per peer is reported
//! and skipped.

use std::path::PathBuf;
use std::time::Duration;

use libp2p::{identity::DecodingError, multiaddr, Multiaddr, PeerId};
use thiserror::Error;

/// Failure to establish the local node identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    KeyFormat(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

impl From<DecodingError> for IdentityError {
    fn from(e: DecodingError) -> Self {
        IdentityError::KeyFormat(e.to_string())
    }
}

#[derive(Debug, Error)]
#[error("invalid listen address {addr:?}: {source}")]
pub struct ListenAddressError {
    pub addr: String,
    #[source]
    pub source: multiaddr::Error,
}

/// A retained bootstrap line that is not a valid multiaddr.
#[derive(Debug, Error)]
#[error("bootstrap line {line}: invalid address {raw:?}: {source}")]
pub struct BootstrapAddressParseError {
    /// 1-based line number in the source text.
    pub line: usize,
    pub raw: String,
    #[source]
    pub source: multiaddr::Error,
}

/// A bootstrap address that cannot be split into peer id and transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressResolutionError {
    #[error("{0} does not end with a /p2p/<peer id> component")]
    MissingPeerId(Multiaddr),

    #[error("{0} has no transport component before its peer id")]
    MissingTransport(Multiaddr),
}

/// Dial failure reported by the network host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Why a single bootstrap attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("address resolution failed: {0}")]
    Resolution(#[from] AddressResolutionError),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("connect failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    ListenAddress(#[from] ListenAddressError),

    #[error("network construction failed: {0}")]
    Construction(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("key material belongs to {derived}, not {expected}")]
    PeerIdMismatch { expected: PeerId, derived: PeerId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("network host is no longer running")]
    HostStopped,
}

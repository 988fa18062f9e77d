//! dhtnode - join a libp2p Kademlia overlay from a static bootstrap list
//!
//! Startup establishes the node identity, binds the listen address, dials
//! every configured bootstrap peer under a per-dial deadline and then hands
//! the host to the DHT, however many of those dials succeeded.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod host;
pub mod keys;
pub mod node;
pub mod peerstore;
pub mod routing;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use bootstrap::{BootstrapList, BootstrapOptions, BootstrapReport};
pub use config::{LogLevel, NodeConfig};
pub use host::{Host, HostHandle, SwarmHost};
pub use keys::NodeIdentity;
pub use peerstore::{AddrTtl, PeerInfo, Peerstore};
pub use routing::{Routing, RoutingHandle};

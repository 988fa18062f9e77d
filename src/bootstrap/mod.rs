/*! Bootstrap peers: parsing the configured list and dialing it.

- `list`: newline-separated multiaddrs into [`BootstrapAddress`] values
- `connect`: one deadline-bound dial per address, failures recorded and skipped
*/

pub mod connect;
pub mod list;

pub use connect::{
    connect_to_bootstrap_peers, BootstrapOptions, BootstrapReport, ConnectionAttempt,
    DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_CONCURRENT_DIALS,
};
pub use list::{parse_bootstrap_list, BootstrapAddress, BootstrapList};

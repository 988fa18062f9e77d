/*! Node configuration and logging setup.

Exports:
- `NodeConfig`: everything `node::run` needs to start a node
- `LogLevel`: common log-level type used across the crate
- `init_tracing()`: initializes the global tracing subscriber

*/

use std::path::PathBuf;

use crate::bootstrap::BootstrapOptions;
use crate::keys::KeyAlgorithm;
use crate::routing::RoutingConfig;

/// Listen address used when none is configured.
pub const DEFAULT_LISTEN_ADDR: &str = "/ip4/0.0.0.0/tcp/7000";

/// Environment variable holding a full `EnvFilter` directive string.
pub const LOG_ENV_VAR: &str = "DHTNODE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Private key file. A fresh key is generated when absent.
    pub key_file: Option<PathBuf>,
    /// Algorithm for a generated key.
    pub key_algorithm: KeyAlgorithm,
    /// Newline-separated bootstrap multiaddrs.
    pub bootstrap_file: Option<PathBuf>,
    pub listen: String,
    pub bootstrap: BootstrapOptions,
    pub routing: RoutingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            key_file: None,
            key_algorithm: KeyAlgorithm::default(),
            bootstrap_file: None,
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            bootstrap: BootstrapOptions::default(),
            routing: RoutingConfig::default(),
        }
    }
}

/// Log level options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!(
                "Invalid log level: {s}. Must be one of: trace, debug, info, warn, error"
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Filter used when `DHTNODE_LOG` is not set. libp2p internals stay at
/// `warn` unless asked for.
pub fn default_filter(log_level: LogLevel) -> String {
    format!("{log_level},libp2p=warn,libp2p_swarm=warn,multistream_select=warn,yamux=warn")
}

/// Initialize tracing with the specified log level
///
/// `DHTNODE_LOG` wins when set. Initialization is a no-op if a global
/// subscriber already exists.
pub fn init_tracing(log_level: LogLevel) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| default_filter(log_level).into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}

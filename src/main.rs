use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use dhtnode::bootstrap::{BootstrapOptions, DEFAULT_MAX_CONCURRENT_DIALS};
use dhtnode::config::{self, LogLevel, NodeConfig, DEFAULT_LISTEN_ADDR};
use dhtnode::keys::{self, KeyAlgorithm};
use dhtnode::routing::{RoutingConfig, RoutingMode, DEFAULT_MAX_RECORDS};

#[derive(Parser)]
#[command(name = "dhtnode")]
#[command(about = "Kademlia DHT node that joins the overlay through a list of bootstrap peers.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node, dial the bootstrap peers and serve the DHT until Ctrl-C.
    Run {
        /// Private key file. A fresh key is generated when omitted.
        #[arg(long)]
        keyfile: Option<PathBuf>,

        /// File with one bootstrap multiaddr per line, each ending in /p2p/<peer id>.
        #[arg(long)]
        bootstrap: Option<PathBuf>,

        /// Multiaddr to listen on
        #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
        listen: String,

        /// Algorithm for a generated key (ed25519, secp256k1, ecdsa)
        #[arg(long, default_value_t = KeyAlgorithm::default())]
        key_type: KeyAlgorithm,

        /// Per-peer dial timeout in seconds
        #[arg(long, default_value = "10")]
        dial_timeout: u64,

        /// Bootstrap dials in flight at once. 1 dials strictly in order.
        #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_DIALS)]
        max_concurrent_dials: usize,

        /// DHT mode (server, client)
        #[arg(long, default_value_t = RoutingMode::default())]
        routing_mode: RoutingMode,

        /// Capacity of the in-memory record store
        #[arg(long, default_value_t = DEFAULT_MAX_RECORDS)]
        max_records: usize,

        /// Log level (trace, debug, info, warn, error). DHTNODE_LOG overrides it.
        #[arg(long, default_value_t = LogLevel::default())]
        loglvl: LogLevel,
    },

    /// Generate a private key, write it to PATH and print its peer id.
    Keygen {
        path: PathBuf,

        #[arg(long, default_value_t = KeyAlgorithm::default())]
        key_type: KeyAlgorithm,
    },
}

impl Commands {
    async fn run(self) -> Result<()> {
        match self {
            Commands::Run {
                keyfile,
                bootstrap,
                listen,
                key_type,
                dial_timeout,
                max_concurrent_dials,
                routing_mode,
                max_records,
                loglvl,
            } => {
                config::init_tracing(loglvl);

                let config = NodeConfig {
                    key_file: keyfile,
                    key_algorithm: key_type,
                    bootstrap_file: bootstrap,
                    listen,
                    bootstrap: BootstrapOptions {
                        dial_timeout: Duration::from_secs(dial_timeout),
                        max_concurrent_dials,
                    },
                    routing: RoutingConfig {
                        mode: routing_mode,
                        max_records,
                    },
                };

                dhtnode::node::run(config, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(reason = %e, "Failed to listen for Ctrl-C");
                    }
                })
                .await
            }
            Commands::Keygen { path, key_type } => {
                let identity = keys::generate(key_type)?;
                keys::save(&identity, &path)?;
                println!("{}", identity.peer_id());
                Ok(())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.command.run().await
}

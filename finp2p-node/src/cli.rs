use clap::Parser;

/// Process bootstrap arguments (SPEC_FULL.md §10), grounded on
/// `atlas_node::cli::Args` (the field set: config path, listen address,
/// node/router id) but expressed as `clap::Parser` derive, the way the
/// dependency is meant to be used.
#[derive(Debug, Parser)]
#[command(name = "finp2p-node", about = "FinP2P router process")]
pub struct Args {
    /// Path to the router's JSON configuration file.
    #[arg(long, default_value = "config.json")]
    pub config: String,

    /// Overrides `routerId` from the configuration file.
    #[arg(long)]
    pub router_id: Option<String>,

    /// Admin HTTP surface bind host. Overrides `host` from configuration.
    #[arg(long)]
    pub host: Option<String>,

    /// Admin HTTP surface bind port. Overrides `port` from configuration.
    #[arg(long)]
    pub port: Option<u32>,

    /// Path to a file holding a 32-byte hex-encoded Ed25519 seed. A fresh
    /// key is generated and printed to stderr if absent.
    #[arg(long, default_value = "router.key")]
    pub keypair_path: String,
}

//! Node binary: loads configuration, brings up tracing, opens the embedded
//! chain store and starts a node listening on the in-process transport.
//! Real TCP/libp2p framing is out of scope; this binary exists to exercise
//! the wiring end to end the way the mining workflow's own tests do, against
//! a transport that a future networking crate can replace without touching
//! this file's structure.

use anyhow::{Context, Result};
use archethic_crypto::{Crypto, DefaultCrypto};
use archethic_election::SeedSortElection;
use archethic_networking::LocalP2P;
use archethic_node::config::NodeConfig;
use archethic_node::Node;
use archethic_types::keys::CurveId;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(name = "archethic-node", about = "Archethic node core: mining + embedded chain storage")]
struct Opts {
    /// Path to a TOML configuration file. Falls back to built-in defaults
    /// for any field it omits, and to `NodeConfig::default()` entirely if
    /// the file does not exist.
    #[clap(long, default_value = "archethic-node.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let config = NodeConfig::load(&opts.config).context("failed to load node configuration")?;
    std::fs::create_dir_all(&config.db_path)
        .with_context(|| format!("failed to create db_path {}", config.db_path.display()))?;

    let crypto = DefaultCrypto;
    let keypair = crypto
        .generate_keypair(CurveId::Ed25519.id())
        .context("failed to generate node identity keypair")?;
    tracing::info!(target: "node", public_key = %keypair.public_key(), "node identity ready");

    let transport = Arc::new(LocalP2P::new());
    let node = Node::start(
        config.clone(),
        keypair,
        Arc::new(DefaultCrypto),
        Arc::new(SeedSortElection),
        transport,
    )
    .context("failed to start node")?;

    tracing::info!(
        target: "node",
        rpc_listen_address = %config.rpc_listen_address,
        public_key = %node.public_key(),
        "node running, no transactions will arrive until a transport submits one"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!(target: "node", "shutdown signal received");

    Ok(())
}

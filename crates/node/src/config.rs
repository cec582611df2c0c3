//! On-disk node configuration, loaded from TOML with sensible defaults for
//! every field so a bare `[node]` section (or a missing file) still boots.

use archethic_mining::StorageQuorum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub db_path: PathBuf,
    pub writer_pool_size: usize,
    pub global_mining_timeout_ms: u64,
    pub cross_validator_rtt_margin_ms: u64,
    pub replication_deadline_ms: u64,
    pub storage_ack_quorum: QuorumConfig,
    pub bloom_fpp: f64,
    pub rpc_listen_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./archethic-data"),
            writer_pool_size: 20,
            global_mining_timeout_ms: 5_000,
            cross_validator_rtt_margin_ms: 500,
            replication_deadline_ms: 3_000,
            storage_ack_quorum: QuorumConfig::All,
            bloom_fpp: 0.001,
            rpc_listen_address: "127.0.0.1:9735".to_string(),
        }
    }
}

impl NodeConfig {
    /// Loads configuration from `path`, falling back to [`NodeConfig::default`]
    /// when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(target: "node", path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn storage_quorum(&self) -> StorageQuorum {
        match self.storage_ack_quorum {
            QuorumConfig::All => StorageQuorum::All,
            QuorumConfig::Threshold(n) => StorageQuorum::Threshold(n),
        }
    }
}

/// TOML-friendly mirror of [`StorageQuorum`]: `archethic_mining`'s own type
/// has no `Serialize`/`Deserialize` impl since the mining crate has no
/// reason to depend on serde.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumConfig {
    All,
    Threshold(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = NodeConfig::load(Path::new("/nonexistent/archethic-node.toml")).unwrap();
        assert_eq!(config.writer_pool_size, 20);
        assert!(matches!(config.storage_ack_quorum, QuorumConfig::All));
    }

    #[test]
    fn parses_a_partial_toml_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "writer_pool_size = 4\nstorage_ack_quorum = { threshold = 3 }\n").unwrap();
        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.writer_pool_size, 4);
        assert!(matches!(config.storage_ack_quorum, QuorumConfig::Threshold(3)));
        assert_eq!(config.bloom_fpp, 0.001);
    }
}

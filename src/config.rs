//! Configuration for the devvd daemon.
//!
//! A TOML file describes the node's place in the shard topology, its key
//! material (hex), consensus knobs and logging. Missing fields fall back to
//! defaults so a generated config stays short.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain_state::ChainState;
use crate::constants::consensus;
use crate::context::{AppMode, DevvContext};
use crate::crypto;
use crate::error::{DevvError, DevvResult};
use crate::keyring::KeyRing;
use crate::types::Address;

/// Platform-specific data directory for devvd.
pub fn get_data_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("devvd")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".devvd")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub node: NodeSection,
    pub shard: ShardSection,
    #[serde(default)]
    pub consensus: ConsensusSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Balances seeded into the chain state ahead of the genesis block.
    #[serde(default)]
    pub genesis: Vec<GenesisEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    pub name: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: "devvd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSection {
    pub shard_name: String,
    /// "t1" for the summary shard, "t2" for a transaction shard.
    #[serde(default = "default_mode")]
    pub mode: String,
    pub node_index: usize,
    pub peer_count: usize,
    /// Compressed public keys (hex) of every node, by global index.
    #[serde(default)]
    pub peer_addresses: Vec<String>,
    /// This node's signing key (hex scalar); an ephemeral key is generated
    /// when absent.
    #[serde(default)]
    pub node_key: Option<String>,
}

impl Default for ShardSection {
    fn default() -> Self {
        Self {
            shard_name: "shard-1".to_string(),
            mode: default_mode(),
            node_index: 0,
            peer_count: 1,
            peer_addresses: Vec::new(),
            node_key: None,
        }
    }
}

fn default_mode() -> String {
    "t2".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSection {
    #[serde(default = "default_max_tx_per_block")]
    pub max_tx_per_block: usize,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_request_interval")]
    pub request_block_interval_secs: u64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            max_tx_per_block: default_max_tx_per_block(),
            max_wait_ms: default_max_wait_ms(),
            request_block_interval_secs: default_request_interval(),
        }
    }
}

fn default_max_tx_per_block() -> usize {
    consensus::DEFAULT_MAX_TX_PER_BLOCK
}

fn default_max_wait_ms() -> u64 {
    consensus::DEFAULT_MAX_WAIT_MS
}

fn default_request_interval() -> u64 {
    consensus::REQUEST_BLOCK_INTERVAL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisEntry {
    /// Hex-encoded 33-byte address.
    pub address: String,
    pub coin: u64,
    pub amount: i64,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> DevvResult<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| DevvError::Config(e.to_string()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> DevvResult<()> {
        let raw = toml::to_string_pretty(self).map_err(|e| DevvError::Config(e.to_string()))?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Load the config, writing a default one if the path does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> DevvResult<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            let config = Self::default();
            config.save_to_file(&path)?;
            tracing::info!("wrote default config to {}", path.as_ref().display());
            Ok(config)
        }
    }

    pub fn build_context(&self) -> DevvResult<DevvContext> {
        let mode = match self.shard.mode.to_lowercase().as_str() {
            "t1" => AppMode::T1,
            "t2" => AppMode::T2,
            other => {
                return Err(DevvError::Config(format!("unknown shard mode '{other}'")));
            }
        };
        if self.shard.peer_count == 0 {
            return Err(DevvError::Config("peer_count must be at least 1".into()));
        }
        Ok(DevvContext::new(
            self.shard.node_index,
            self.shard.peer_count,
            mode,
            self.shard.shard_name.clone(),
            Duration::from_millis(self.consensus.max_wait_ms),
        ))
    }

    pub fn build_keyring(&self) -> DevvResult<KeyRing> {
        let node_key = match &self.shard.node_key {
            Some(hex_key) => {
                let raw = hex::decode(hex_key)
                    .map_err(|e| DevvError::Config(format!("bad node_key hex: {e}")))?;
                k256::ecdsa::SigningKey::from_slice(&raw)
                    .map_err(|e| DevvError::Config(format!("bad node_key scalar: {e}")))?
            }
            None => {
                tracing::warn!("no node_key configured, generating an ephemeral key");
                crypto::generate_key()
            }
        };

        let mut addrs = Vec::with_capacity(self.shard.peer_addresses.len());
        for hex_addr in &self.shard.peer_addresses {
            let raw = hex::decode(hex_addr)
                .map_err(|e| DevvError::Config(format!("bad peer address hex: {e}")))?;
            addrs.push(
                Address::from_slice(&raw)
                    .map_err(|e| DevvError::Config(format!("bad peer address: {e}")))?,
            );
        }
        if addrs.is_empty() {
            // Single-node shard: the address book is just ourselves.
            addrs.push(crypto::address_of(&node_key));
        }
        Ok(KeyRing::new(node_key, addrs))
    }

    pub fn build_genesis_state(&self) -> DevvResult<ChainState> {
        let mut state = ChainState::new();
        for entry in &self.genesis {
            let raw = hex::decode(&entry.address)
                .map_err(|e| DevvError::Config(format!("bad genesis address hex: {e}")))?;
            let addr = Address::from_slice(&raw)
                .map_err(|e| DevvError::Config(format!("bad genesis address: {e}")))?;
            if entry.amount < 0 {
                return Err(DevvError::Config(
                    "genesis balances must be non-negative".into(),
                ));
            }
            state.set_balance(addr, entry.coin, entry.amount);
        }
        Ok(state)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.consensus.request_block_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let reloaded = Config::load_from_file(&path).unwrap();
        assert_eq!(reloaded.shard.peer_count, config.shard.peer_count);
        assert_eq!(reloaded.logging.level, "info");
        assert_eq!(
            reloaded.consensus.max_tx_per_block,
            consensus::DEFAULT_MAX_TX_PER_BLOCK
        );
    }

    #[test]
    fn builds_context_and_keyring() {
        let key = crypto::generate_key();
        let addr = crypto::address_of(&key);
        let config = Config {
            shard: ShardSection {
                shard_name: "shard-9".into(),
                mode: "t2".into(),
                node_index: 2,
                peer_count: 3,
                peer_addresses: vec![
                    hex::encode(addr.as_bytes()),
                    hex::encode(addr.as_bytes()),
                    hex::encode(addr.as_bytes()),
                ],
                node_key: Some(hex::encode(key.to_bytes())),
            },
            ..Config::default()
        };

        let context = config.build_context().unwrap();
        assert_eq!(context.current_node(), 2);
        assert_eq!(context.shard_uri(), "devv/shard-9");

        let keys = config.build_keyring().unwrap();
        assert_eq!(keys.node_addr(), addr);
        assert_eq!(keys.num_nodes(), 3);
    }

    #[test]
    fn rejects_bad_mode_and_keys() {
        let mut config = Config::default();
        config.shard.mode = "t3".into();
        assert!(config.build_context().is_err());

        let mut config = Config::default();
        config.shard.node_key = Some("zz".into());
        assert!(config.build_keyring().is_err());
    }

    #[test]
    fn genesis_state_seeds_balances() {
        let addr = crypto::address_of(&crypto::generate_key());
        let config = Config {
            genesis: vec![GenesisEntry {
                address: hex::encode(addr.as_bytes()),
                coin: 0,
                amount: 500,
            }],
            ..Config::default()
        };
        let state = config.build_genesis_state().unwrap();
        assert_eq!(state.balance(&addr, 0), 500);
    }
}

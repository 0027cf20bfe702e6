use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raft::{NodeId, NodeIdentity, RaftConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid peer spec '{0}': expected id=address")]
    InvalidPeer(String),
}

/// On-disk process configuration.
///
/// ```json
/// {
///   "node": { "id": 1, "address": "127.0.0.1:8001" },
///   "members": [
///     { "id": 2, "address": "127.0.0.1:8002" },
///     { "id": 3, "address": "127.0.0.1:8003" }
///   ],
///   "dataDir": "./data",
///   "timing": { "heartbeatTimeoutMs": 10000 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub node: NodeIdentity,
    /// Other members. Listing the node itself here is tolerated.
    #[serde(default)]
    pub members: Vec<NodeIdentity>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Timing knobs; any field left out keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub heartbeat_timeout_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub rpc_timeout_ms: u64,
    pub tick_ms: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for TimingConfig {
    fn default() -> Self {
        let defaults = RaftConfig::new(1, "");
        Self {
            heartbeat_timeout_ms: defaults.heartbeat_timeout_ms,
            election_timeout_min_ms: defaults.election_timeout_min_ms,
            election_timeout_max_ms: defaults.election_timeout_max_ms,
            heartbeat_interval_ms: defaults.heartbeat_interval_ms,
            rpc_timeout_ms: defaults.rpc_timeout_ms,
            tick_ms: defaults.tick_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeIdentity::new(1, "127.0.0.1:8001"),
            members: vec![],
            data_dir: default_data_dir(),
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Directory holding this node's log file.
    pub fn node_dir(&self) -> PathBuf {
        self.data_dir.join(self.node.id.to_string())
    }

    pub fn log_path(&self) -> PathBuf {
        self.node_dir().join("log.csv")
    }

    /// Replaces the member list with peers parsed from `id=addr,id=addr`.
    pub fn set_peers(&mut self, spec: &str) -> Result<(), ConfigError> {
        self.members = parse_peers(spec)?;
        Ok(())
    }

    pub fn into_raft_config(self) -> RaftConfig {
        let t = self.timing;
        let mut raft = RaftConfig::new(self.node.id, &self.node.address).with_timing(
            t.heartbeat_timeout_ms,
            (t.election_timeout_min_ms, t.election_timeout_max_ms),
            t.heartbeat_interval_ms,
            t.rpc_timeout_ms,
            t.tick_ms,
        );
        for member in &self.members {
            raft.members.push(member.clone());
        }
        // Drop a self entry repeated in `members`; real duplicates are left
        // for `RaftConfig::validate` to report.
        let self_id = self.node.id;
        let mut self_seen = false;
        raft.members.retain(|m| {
            if m.id != self_id {
                return true;
            }
            !std::mem::replace(&mut self_seen, true)
        });
        raft
    }
}

/// Parses `--peers` syntax: `2=127.0.0.1:8002,3=http://127.0.0.1:8003/`.
pub fn parse_peers(spec: &str) -> Result<Vec<NodeIdentity>, ConfigError> {
    let mut peers = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, address) = part
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidPeer(part.to_string()))?;
        let id: NodeId = id
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPeer(part.to_string()))?;
        let address = address.trim();
        if address.is_empty() {
            return Err(ConfigError::InvalidPeer(part.to_string()));
        }
        peers.push(NodeIdentity::new(id, address));
    }
    Ok(peers)
}

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RaftError;

pub type NodeId = u64;

/// One member of the static cluster membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub address: String,
}

impl NodeIdentity {
    pub fn new(id: NodeId, address: &str) -> Self {
        Self {
            id,
            address: address.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub node_id: NodeId,
    pub members: Vec<NodeIdentity>, // full ordered membership, self included
    pub heartbeat_timeout_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub rpc_timeout_ms: u64,
    pub tick_ms: u64,
}

impl RaftConfig {
    pub fn new(node_id: NodeId, address: &str) -> Self {
        Self {
            node_id,
            members: vec![NodeIdentity::new(node_id, address)],
            heartbeat_timeout_ms: 10_000,
            election_timeout_min_ms: 5_000,
            election_timeout_max_ms: 10_000,
            heartbeat_interval_ms: 1_000,
            rpc_timeout_ms: 2_000,
            tick_ms: 1_000,
        }
    }

    pub fn add_peer(&mut self, peer_id: NodeId, address: &str) {
        if peer_id == self.node_id || self.members.iter().any(|m| m.id == peer_id) {
            return;
        }
        self.members.push(NodeIdentity::new(peer_id, address));
    }

    pub fn with_peer(mut self, peer_id: NodeId, address: &str) -> Self {
        self.add_peer(peer_id, address);
        self
    }

    pub fn with_timing(
        mut self,
        heartbeat_timeout_ms: u64,
        election_timeout_ms: (u64, u64),
        heartbeat_interval_ms: u64,
        rpc_timeout_ms: u64,
        tick_ms: u64,
    ) -> Self {
        self.heartbeat_timeout_ms = heartbeat_timeout_ms;
        self.election_timeout_min_ms = election_timeout_ms.0;
        self.election_timeout_max_ms = election_timeout_ms.1;
        self.heartbeat_interval_ms = heartbeat_interval_ms;
        self.rpc_timeout_ms = rpc_timeout_ms;
        self.tick_ms = tick_ms;
        self
    }

    /// Cluster size `n`, self included.
    pub fn cluster_size(&self) -> usize {
        self.members.len()
    }

    /// Every member except this node, in membership order.
    pub fn peers(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.members.iter().filter(move |m| m.id != self.node_id)
    }

    pub fn identity(&self) -> Option<&NodeIdentity> {
        self.members.iter().find(|m| m.id == self.node_id)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        if self.node_id == 0 {
            return Err(RaftError::InvalidConfig("node id must be >= 1".into()));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if member.id == 0 {
                return Err(RaftError::InvalidConfig(format!(
                    "member {} has id 0",
                    member.address
                )));
            }
            if !seen.insert(member.id) {
                return Err(RaftError::InvalidConfig(format!(
                    "duplicate member id {}",
                    member.id
                )));
            }
        }

        if self.identity().is_none() {
            return Err(RaftError::InvalidConfig(format!(
                "node {} is not part of the membership",
                self.node_id
            )));
        }

        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            return Err(RaftError::InvalidConfig(format!(
                "election timeout range is empty: {}..={}",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }

        // A vote call must be able to fail before the round it belongs to expires.
        if self.rpc_timeout_ms >= self.election_timeout_min_ms {
            return Err(RaftError::InvalidConfig(format!(
                "rpc timeout {}ms must be shorter than the minimum election timeout {}ms",
                self.rpc_timeout_ms, self.election_timeout_min_ms
            )));
        }

        if self.tick_ms == 0 || self.heartbeat_interval_ms == 0 {
            return Err(RaftError::InvalidConfig(
                "tick and heartbeat interval must be non-zero".into(),
            ));
        }

        Ok(())
    }
}

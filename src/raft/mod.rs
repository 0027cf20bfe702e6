mod config;
mod election;
mod error;
mod heartbeat;
mod node;
mod quorum;
mod state;
mod timer;
mod transport;

pub use self::config::{NodeId, NodeIdentity, RaftConfig};
pub use self::election::{ElectionOutcome, ElectionRound};
pub use self::error::RaftError;
pub use self::node::RaftNode;
pub use self::quorum::{is_majority, tally, tally_map, PeerVote, QuorumOutcome};
pub use self::state::{NodeRole, NodeState, NodeStatus};
pub use self::timer::random_election_timeout;
pub use self::transport::{RaftHandler, Transport};

use serde::{Deserialize, Serialize};

// RPC payloads exchanged between nodes. Encoding is the transport's business.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub term: u64,
    pub leader_id: NodeId,
}

/// Liveness ack. Carries the responder's term so a superseded leader notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub term: u64,
}

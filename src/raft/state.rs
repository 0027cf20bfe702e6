use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Follower => write!(f, "follower"),
            NodeRole::Candidate => write!(f, "candidate"),
            NodeRole::Leader => write!(f, "leader"),
        }
    }
}

/// Mutable consensus state of one node. Lives behind a single lock in
/// [`RaftNode`](super::RaftNode); every method here is one short critical
/// section and never touches the network.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub current_term: u64,
    /// Scoped to `current_term`; cleared whenever the term advances.
    pub voted_for: Option<NodeId>,
    pub role: NodeRole,
    pub leader_id: Option<NodeId>,
    pub last_contact: Instant,
    /// Extra patience added to the heartbeat timeout after a rejected
    /// candidacy, so candidates that collided do not time out in lockstep.
    /// Cleared by the next valid contact.
    pub backoff: Duration,
}

/// Serializable snapshot of [`NodeState`] for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub id: NodeId,
    pub term: u64,
    pub role: NodeRole,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
}

impl NodeState {
    pub fn new(term: u64, now: Instant) -> Self {
        Self {
            current_term: term,
            voted_for: None,
            role: NodeRole::Follower,
            leader_id: None,
            last_contact: now,
            backoff: Duration::ZERO,
        }
    }

    /// Adopts `term` if it is newer than ours: the vote is reset and the
    /// node falls back to follower. Returns whether anything changed.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }
        self.current_term = term;
        self.voted_for = None;
        self.leader_id = None;
        self.role = NodeRole::Follower;
        true
    }

    /// Starts a new candidacy: bumps the term and votes for `self_id`.
    pub fn become_candidate(&mut self, self_id: NodeId) -> u64 {
        self.current_term += 1;
        self.voted_for = Some(self_id);
        self.leader_id = None;
        self.role = NodeRole::Candidate;
        self.current_term
    }

    /// Leadership is only granted to the candidacy that is still running.
    pub fn become_leader(&mut self, self_id: NodeId, term: u64) -> bool {
        if self.role != NodeRole::Candidate || self.current_term != term {
            return false;
        }
        self.role = NodeRole::Leader;
        self.leader_id = Some(self_id);
        true
    }

    /// Drops back to follower, leaving term and vote untouched. `backoff`
    /// delays the next timeout beyond the usual heartbeat timeout.
    pub fn step_down(&mut self, now: Instant, backoff: Duration) {
        self.role = NodeRole::Follower;
        self.last_contact = now;
        self.backoff = backoff;
    }

    /// Applies the RequestVote rule and returns whether the vote is granted.
    pub fn decide_vote(&mut self, candidate_term: u64, candidate_id: NodeId, now: Instant) -> bool {
        if candidate_term < self.current_term {
            return false;
        }

        self.observe_term(candidate_term);

        match self.voted_for {
            Some(id) if id != candidate_id => false,
            _ => {
                self.voted_for = Some(candidate_id);
                self.last_contact = now;
                self.backoff = Duration::ZERO;
                true
            }
        }
    }

    /// Applies a liveness RPC. Stale heartbeats change nothing, not even the
    /// contact clock. Returns whether the heartbeat was accepted.
    pub fn accept_heartbeat(&mut self, leader_term: u64, leader_id: NodeId, now: Instant) -> bool {
        if leader_term < self.current_term {
            return false;
        }

        self.observe_term(leader_term);
        if self.role != NodeRole::Follower {
            self.role = NodeRole::Follower;
        }
        self.leader_id = Some(leader_id);
        self.last_contact = now;
        self.backoff = Duration::ZERO;
        true
    }

    pub fn contact_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_contact) > timeout + self.backoff
    }

    pub fn status(&self, id: NodeId) -> NodeStatus {
        NodeStatus {
            id,
            term: self.current_term,
            role: self.role,
            voted_for: self.voted_for,
            leader_id: self.leader_id,
        }
    }
}

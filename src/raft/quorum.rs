use std::collections::BTreeMap;

use super::NodeId;

/// What one member has answered during an election round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerVote {
    Unknown,
    Granted,
    Denied,
    /// Transport failure. Retryable, and never counted as a denial.
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumOutcome {
    Pending,
    Accepted,
    Rejected,
}

/// Strict majority test over a fixed cluster size.
pub fn is_majority(count: usize, cluster_size: usize) -> bool {
    count * 2 > cluster_size
}

pub fn tally<'a, I>(votes: I, cluster_size: usize) -> QuorumOutcome
where
    I: IntoIterator<Item = &'a PeerVote>,
{
    let (mut granted, mut denied) = (0usize, 0usize);
    for vote in votes {
        match vote {
            PeerVote::Granted => granted += 1,
            PeerVote::Denied => denied += 1,
            PeerVote::Unknown | PeerVote::Unreachable => {}
        }
    }

    if is_majority(granted, cluster_size) {
        QuorumOutcome::Accepted
    } else if is_majority(denied, cluster_size) {
        QuorumOutcome::Rejected
    } else {
        QuorumOutcome::Pending
    }
}

/// Convenience wrapper for callers that keep votes keyed by member.
pub fn tally_map(votes: &BTreeMap<NodeId, PeerVote>, cluster_size: usize) -> QuorumOutcome {
    tally(votes.values(), cluster_size)
}

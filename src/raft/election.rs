use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ::log::{debug, info, warn};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};

use super::quorum::{tally_map, PeerVote, QuorumOutcome};
use super::timer::random_election_timeout;
use super::{NodeId, NodeRole, RaftError, RaftNode, Transport, VoteRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    BecameLeader,
    BecameFollower,
    TimedOut,
}

/// Bookkeeping for one candidacy, from term increment to resolution.
#[derive(Debug, Clone)]
pub struct ElectionRound {
    term: u64,
    started_at: Instant,
    deadline: Instant,
    cluster_size: usize,
    votes: BTreeMap<NodeId, PeerVote>,
}

impl ElectionRound {
    pub fn new<I>(term: u64, self_id: NodeId, peers: I, started_at: Instant, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut votes: BTreeMap<NodeId, PeerVote> =
            peers.into_iter().map(|id| (id, PeerVote::Unknown)).collect();
        votes.insert(self_id, PeerVote::Granted);
        let cluster_size = votes.len();

        Self {
            term,
            started_at,
            deadline: started_at + timeout,
            cluster_size,
            votes,
        }
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn vote_of(&self, peer: NodeId) -> Option<PeerVote> {
        self.votes.get(&peer).copied()
    }

    /// Records a peer's answer. A definite answer is never overwritten.
    pub fn record(&mut self, peer: NodeId, vote: PeerVote) {
        if let Some(slot) = self.votes.get_mut(&peer) {
            if matches!(slot, PeerVote::Unknown | PeerVote::Unreachable) {
                *slot = vote;
            }
        }
    }

    /// Peers that still need to be asked: never answered, or unreachable so far.
    pub fn retryable(&self) -> Vec<NodeId> {
        self.votes
            .iter()
            .filter(|(_, v)| matches!(v, PeerVote::Unknown | PeerVote::Unreachable))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn granted(&self) -> usize {
        self.count(PeerVote::Granted)
    }

    pub fn denied(&self) -> usize {
        self.count(PeerVote::Denied)
    }

    pub fn unreachable(&self) -> usize {
        self.count(PeerVote::Unreachable)
    }

    fn count(&self, wanted: PeerVote) -> usize {
        self.votes.values().filter(|v| **v == wanted).count()
    }

    pub fn outcome(&self) -> QuorumOutcome {
        tally_map(&self.votes, self.cluster_size)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

impl<T: Transport> RaftNode<T> {
    /// Runs one candidacy to resolution. Vote requests go out concurrently,
    /// one task per peer, and the quorum is rechecked after every reply.
    pub(super) async fn run_election(&self) -> ElectionOutcome {
        let config = self.config();
        let term = {
            let mut state = self.state.lock().await;
            if state.role != NodeRole::Candidate {
                return ElectionOutcome::BecameFollower;
            }
            state.become_candidate(self.id())
        };

        let election_timeout =
            random_election_timeout(config.election_timeout_min_ms, config.election_timeout_max_ms);
        let mut round = ElectionRound::new(
            term,
            self.id(),
            config.peers().map(|p| p.id),
            Instant::now(),
            election_timeout,
        );

        info!(
            "Node {} starting election for term {} (timeout {:?}, cluster of {})",
            self.id(),
            term,
            election_timeout,
            round.cluster_size()
        );

        loop {
            if let Some(outcome) = self.resolve(&round).await {
                return outcome;
            }

            let now = Instant::now();
            if round.expired(now) {
                warn!(
                    "Election for term {} timed out with {} granted, {} denied, {} unreachable",
                    term,
                    round.granted(),
                    round.denied(),
                    round.unreachable()
                );
                return ElectionOutcome::TimedOut;
            }

            let targets = round.retryable();
            if !targets.is_empty() {
                let per_call = config.rpc_timeout().min(round.remaining(now));
                let mut calls = self.request_votes(&targets, term, per_call);

                while let Some(joined) = calls.join_next().await {
                    let (peer_id, result) = match joined {
                        Ok(reply) => reply,
                        Err(e) => {
                            debug!("Vote request task failed: {e}");
                            continue;
                        }
                    };

                    match result {
                        Ok(reply) if reply.term > term => {
                            let mut state = self.state.lock().await;
                            if state.observe_term(reply.term) {
                                state.last_contact = Instant::now();
                            }
                            info!(
                                "Node {} abandoning election for term {}: peer {} is at term {}",
                                self.id(),
                                term,
                                peer_id,
                                reply.term
                            );
                            return ElectionOutcome::BecameFollower;
                        }
                        Ok(reply) => {
                            let vote = if reply.vote_granted {
                                PeerVote::Granted
                            } else {
                                PeerVote::Denied
                            };
                            debug!("Peer {peer_id} answered {vote:?} for term {term}");
                            round.record(peer_id, vote);
                        }
                        Err(e) => {
                            debug!("Peer {peer_id} unreachable during election: {e}");
                            round.record(peer_id, PeerVote::Unreachable);
                        }
                    }

                    if let Some(outcome) = self.resolve(&round).await {
                        return outcome;
                    }
                }
            }

            let pause = config.tick().min(round.remaining(Instant::now()));
            if !pause.is_zero() {
                sleep(pause).await;
            }
        }
    }

    fn request_votes(
        &self,
        targets: &[NodeId],
        term: u64,
        per_call: Duration,
    ) -> JoinSet<(NodeId, Result<super::VoteResponse, RaftError>)> {
        let request = VoteRequest {
            term,
            candidate_id: self.id(),
        };
        let mut calls = JoinSet::new();

        for peer in self.config().peers().filter(|p| targets.contains(&p.id)) {
            let peer = peer.clone();
            let transport = Arc::clone(&self.transport);
            calls.spawn(async move {
                let result = match timeout(per_call, transport.request_vote(&peer, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(RaftError::Timeout),
                };
                (peer.id, result)
            });
        }

        calls
    }

    /// Applies the round's current tally under the lock. `None` means keep going.
    async fn resolve(&self, round: &ElectionRound) -> Option<ElectionOutcome> {
        let mut state = self.state.lock().await;

        if state.role != NodeRole::Candidate || state.current_term != round.term() {
            debug!(
                "Node {} left candidacy for term {} (now {} at term {})",
                self.id(),
                round.term(),
                state.role,
                state.current_term
            );
            return Some(ElectionOutcome::BecameFollower);
        }

        match round.outcome() {
            QuorumOutcome::Accepted => {
                state.become_leader(self.id(), round.term());
                info!(
                    "Node {} becoming leader for term {} with {} of {} votes",
                    self.id(),
                    round.term(),
                    round.granted(),
                    round.cluster_size()
                );
                Some(ElectionOutcome::BecameLeader)
            }
            QuorumOutcome::Rejected => {
                let config = self.config();
                let backoff = random_election_timeout(
                    config.election_timeout_min_ms,
                    config.election_timeout_max_ms,
                );
                state.step_down(Instant::now(), backoff);
                info!(
                    "Node {} rejected by {} of {} members in term {}, returning to follower (backoff {:?})",
                    self.id(),
                    round.denied(),
                    round.cluster_size(),
                    round.term(),
                    backoff
                );
                Some(ElectionOutcome::BecameFollower)
            }
            QuorumOutcome::Pending => None,
        }
    }
}

use std::sync::Arc;

use ::log::{debug, info, warn};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use super::election::ElectionOutcome;
use super::{
    HeartbeatRequest, HeartbeatResponse, NodeId, NodeRole, NodeState, NodeStatus, RaftConfig,
    RaftError, RaftHandler, Transport, VoteRequest, VoteResponse,
};
use crate::storage::LogStore;

pub struct RaftNode<T: Transport> {
    // Node identity
    id: NodeId,
    config: RaftConfig,

    // Term, vote, role and last contact, all behind one lock. Never held
    // across a network call.
    pub(super) state: Arc<Mutex<NodeState>>,

    // Communication
    pub(super) transport: Arc<T>,
}

impl<T: Transport> RaftNode<T> {
    /// Builds a follower from the log store's last known term. The store is
    /// read exactly once.
    pub fn start(store: &dyn LogStore, config: RaftConfig, transport: T) -> Result<Arc<Self>, RaftError> {
        config.validate()?;
        let (last_term, last_index) = store.init_log()?;

        info!(
            "Node {} starting as follower at term {} (last log index {}), cluster of {}",
            config.node_id,
            last_term,
            last_index,
            config.cluster_size()
        );

        Ok(Arc::new(Self {
            id: config.node_id,
            state: Arc::new(Mutex::new(NodeState::new(last_term, Instant::now()))),
            config,
            transport: Arc::new(transport),
        }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub async fn role(&self) -> NodeRole {
        self.state.lock().await.role
    }

    pub async fn term(&self) -> u64 {
        self.state.lock().await.current_term
    }

    pub async fn is_leader(&self) -> bool {
        self.role().await == NodeRole::Leader
    }

    /// Copy of the full state record, mostly for inspection in tests.
    pub async fn snapshot(&self) -> NodeState {
        self.state.lock().await.clone()
    }

    /// Drives the role loop forever.
    pub async fn run(self: Arc<Self>) {
        info!("Node {} entering role loop", self.id);
        loop {
            self.step().await;
        }
    }

    /// One pass of the role loop for whatever role the node holds right now.
    pub async fn step(&self) -> NodeRole {
        let role = self.role().await;
        match role {
            NodeRole::Follower => self.follower_tick().await,
            NodeRole::Candidate => self.candidate_tick().await,
            NodeRole::Leader => self.leader_tick().await,
        }
        role
    }

    async fn follower_tick(&self) {
        {
            let mut state = self.state.lock().await;
            // Re-read under the lock; a handler may have changed things.
            if state.role != NodeRole::Follower {
                return;
            }
            let now = Instant::now();
            if state.contact_expired(now, self.config.heartbeat_timeout()) {
                info!(
                    "Node {} heard nothing for {:?} in term {}, becoming candidate",
                    self.id,
                    now.saturating_duration_since(state.last_contact),
                    state.current_term
                );
                state.role = NodeRole::Candidate;
                return;
            }
        }
        sleep(self.config.tick()).await;
    }

    async fn candidate_tick(&self) {
        match self.run_election().await {
            ElectionOutcome::BecameLeader => {}
            ElectionOutcome::BecameFollower => {
                let mut state = self.state.lock().await;
                if state.role == NodeRole::Follower {
                    state.last_contact = Instant::now();
                }
            }
            ElectionOutcome::TimedOut => {
                warn!("Node {} split vote, retrying with a new term", self.id);
            }
        }
    }

    async fn leader_tick(&self) {
        let sent = self.broadcast_heartbeats().await;
        debug!("Node {} sent {} heartbeats", self.id, sent);
        sleep(self.config.heartbeat_interval()).await;
    }

    /// Forces the node into candidacy; the next `step` runs an election.
    #[cfg(test)]
    pub(crate) async fn campaign(&self) {
        let mut state = self.state.lock().await;
        if state.role == NodeRole::Follower {
            state.role = NodeRole::Candidate;
        }
    }
}

#[async_trait]
impl<T: Transport> RaftHandler for RaftNode<T> {
    async fn handle_request_vote(&self, request: VoteRequest) -> VoteResponse {
        let mut state = self.state.lock().await;
        let previous = state.role;
        let vote_granted = state.decide_vote(request.term, request.candidate_id, Instant::now());

        if previous != state.role {
            info!(
                "Node {} stepping down from {} after RequestVote at term {}",
                self.id, previous, request.term
            );
        }
        debug!(
            "Node {} vote for candidate {} in term {}: granted={}",
            self.id, request.candidate_id, request.term, vote_granted
        );

        VoteResponse {
            term: state.current_term,
            vote_granted,
        }
    }

    async fn handle_heartbeat(&self, request: HeartbeatRequest) -> HeartbeatResponse {
        let mut state = self.state.lock().await;
        let previous = state.role;

        if state.accept_heartbeat(request.term, request.leader_id, Instant::now()) {
            if previous != NodeRole::Follower {
                info!(
                    "Node {} stepping down from {}: leader {} is live at term {}",
                    self.id, previous, request.leader_id, request.term
                );
            }
        } else {
            debug!(
                "Node {} ignoring stale heartbeat from {} (term {} < {})",
                self.id, request.leader_id, request.term, state.current_term
            );
        }

        HeartbeatResponse {
            term: state.current_term,
        }
    }

    async fn status(&self) -> NodeStatus {
        self.state.lock().await.status(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::NodeIdentity;
    use crate::storage::MemLogStore;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Reply {
        Grant,
        Deny,
        DenyAt(u64),
        Unreachable,
        Hang,
    }

    /// Answers every call from a fixed per-peer script.
    #[derive(Default)]
    struct ScriptedTransport {
        votes: HashMap<NodeId, Reply>,
        heartbeat_term: HashMap<NodeId, u64>,
        vote_calls: StdMutex<Vec<NodeId>>,
        heartbeat_calls: StdMutex<Vec<(NodeId, HeartbeatRequest)>>,
    }

    impl ScriptedTransport {
        fn voting(script: &[(NodeId, Reply)]) -> Self {
            Self {
                votes: script.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request_vote(
            &self,
            peer: &NodeIdentity,
            request: VoteRequest,
        ) -> Result<VoteResponse, RaftError> {
            self.vote_calls.lock().unwrap().push(peer.id);
            match self.votes.get(&peer.id).copied().unwrap_or(Reply::Unreachable) {
                Reply::Grant => Ok(VoteResponse { term: request.term, vote_granted: true }),
                Reply::Deny => Ok(VoteResponse { term: request.term, vote_granted: false }),
                Reply::DenyAt(term) => Ok(VoteResponse { term, vote_granted: false }),
                Reply::Unreachable => Err(RaftError::NetworkError("connection refused".into())),
                Reply::Hang => {
                    sleep(Duration::from_secs(3600)).await;
                    Err(RaftError::Timeout)
                }
            }
        }

        async fn heartbeat(
            &self,
            peer: &NodeIdentity,
            request: HeartbeatRequest,
        ) -> Result<HeartbeatResponse, RaftError> {
            self.heartbeat_calls.lock().unwrap().push((peer.id, request));
            let term = self.heartbeat_term.get(&peer.id).copied().unwrap_or(request.term);
            Ok(HeartbeatResponse { term })
        }
    }

    fn cluster_config(n: u64) -> RaftConfig {
        let mut cfg = RaftConfig::new(1, "n1").with_timing(200, (150, 150), 20, 30, 10);
        for id in 2..=n {
            cfg.add_peer(id, &format!("n{id}"));
        }
        cfg
    }

    fn node(n: u64, transport: ScriptedTransport) -> Arc<RaftNode<ScriptedTransport>> {
        RaftNode::start(&MemLogStore::new(), cluster_config(n), transport).expect("start")
    }

    async fn elect(node: &RaftNode<ScriptedTransport>) -> ElectionOutcome {
        node.campaign().await;
        node.run_election().await
    }

    #[tokio::test]
    async fn start_reads_term_from_log_store_once() {
        let store = MemLogStore::with_last(4, 12);
        let node = RaftNode::start(&store, cluster_config(3), ScriptedTransport::default())
            .expect("start");

        assert_eq!(store.init_calls(), 1);
        let state = node.snapshot().await;
        assert_eq!(state.current_term, 4);
        assert_eq!(state.voted_for, None);
        assert_eq!(state.role, NodeRole::Follower);
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let mut cfg = cluster_config(3);
        cfg.rpc_timeout_ms = 10_000;
        let result = RaftNode::start(&MemLogStore::new(), cfg, ScriptedTransport::default());
        assert!(matches!(result, Err(RaftError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn clean_three_node_election_wins() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Grant), (3, Reply::Grant)]));

        assert_eq!(elect(&node).await, ElectionOutcome::BecameLeader);
        let state = node.snapshot().await;
        assert_eq!(state.role, NodeRole::Leader);
        assert_eq!(state.current_term, 1);
        assert_eq!(state.voted_for, Some(1));
        assert_eq!(state.leader_id, Some(1));
    }

    #[tokio::test]
    async fn single_node_cluster_elects_itself_without_rpcs() {
        let transport = ScriptedTransport::default();
        let node = node(1, transport);

        assert_eq!(elect(&node).await, ElectionOutcome::BecameLeader);
        assert!(node.transport.vote_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn majority_of_denials_returns_to_follower() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Deny), (3, Reply::Deny)]));

        assert_eq!(elect(&node).await, ElectionOutcome::BecameFollower);
        let state = node.snapshot().await;
        assert_eq!(state.role, NodeRole::Follower);
        assert_eq!(state.current_term, 1);
        // Rejected candidates wait out an extra election timeout.
        assert_eq!(state.backoff, Duration::from_millis(150));
    }

    #[tokio::test]
    async fn rejected_candidate_waits_longer_before_next_candidacy() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Deny), (3, Reply::Deny)]));
        assert_eq!(elect(&node).await, ElectionOutcome::BecameFollower);

        // Past the heartbeat timeout, still inside the backoff.
        sleep(Duration::from_millis(250)).await;
        node.step().await;
        assert_eq!(node.role().await, NodeRole::Follower);

        sleep(Duration::from_millis(150)).await;
        node.step().await;
        assert_eq!(node.role().await, NodeRole::Candidate);
    }

    #[tokio::test]
    async fn unreachable_peers_do_not_count_as_denials() {
        // Self + one grant is 2 of 5: not a majority, and three silent peers
        // must not turn into a rejection either.
        let node = node(
            5,
            ScriptedTransport::voting(&[
                (2, Reply::Grant),
                (3, Reply::Unreachable),
                (4, Reply::Unreachable),
                (5, Reply::Unreachable),
            ]),
        );

        assert_eq!(elect(&node).await, ElectionOutcome::TimedOut);
        let state = node.snapshot().await;
        assert_eq!(state.role, NodeRole::Candidate);

        // Unreachable peers were retried, the granting peer was not.
        let calls = node.transport.vote_calls.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|id| **id == 2).count(), 1);
        assert!(calls.iter().filter(|id| **id == 3).count() > 1);
    }

    #[tokio::test]
    async fn hanging_peer_is_bounded_by_rpc_timeout() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Hang), (3, Reply::Grant)]));

        let started = Instant::now();
        assert_eq!(elect(&node).await, ElectionOutcome::BecameLeader);
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn higher_term_reply_demotes_candidate() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::DenyAt(9)), (3, Reply::Hang)]));

        assert_eq!(elect(&node).await, ElectionOutcome::BecameFollower);
        let state = node.snapshot().await;
        assert_eq!(state.role, NodeRole::Follower);
        assert_eq!(state.current_term, 9);
        assert_eq!(state.voted_for, None);
    }

    #[tokio::test]
    async fn timed_out_candidate_retries_with_fresh_term() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Unreachable), (3, Reply::Unreachable)]));
        node.campaign().await;

        assert_eq!(node.step().await, NodeRole::Candidate);
        assert_eq!(node.term().await, 1);
        assert_eq!(node.step().await, NodeRole::Candidate);
        assert_eq!(node.term().await, 2);
        assert_eq!(node.role().await, NodeRole::Candidate);
    }

    #[tokio::test]
    async fn concurrent_heartbeat_abandons_election() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Hang), (3, Reply::Hang)]));
        node.campaign().await;

        let runner = {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.run_election().await })
        };
        sleep(Duration::from_millis(15)).await;
        node.handle_heartbeat(HeartbeatRequest { term: 1, leader_id: 3 }).await;

        let outcome = runner.await.expect("join");
        assert_eq!(outcome, ElectionOutcome::BecameFollower);
        let state = node.snapshot().await;
        assert_eq!(state.role, NodeRole::Follower);
        assert_eq!(state.leader_id, Some(3));
    }

    #[tokio::test]
    async fn follower_times_out_into_candidate() {
        let node = node(3, ScriptedTransport::default());

        assert_eq!(node.step().await, NodeRole::Follower);
        assert_eq!(node.role().await, NodeRole::Follower);

        sleep(Duration::from_millis(220)).await;
        node.step().await;
        assert_eq!(node.role().await, NodeRole::Candidate);
    }

    #[tokio::test]
    async fn heartbeats_keep_follower_from_timing_out() {
        let node = node(3, ScriptedTransport::default());

        for _ in 0..6 {
            sleep(Duration::from_millis(60)).await;
            node.handle_heartbeat(HeartbeatRequest { term: 0, leader_id: 2 }).await;
            node.step().await;
            assert_eq!(node.role().await, NodeRole::Follower);
        }
    }

    #[tokio::test]
    async fn stale_heartbeat_does_not_reset_contact() {
        let node = node(3, ScriptedTransport::default());
        node.handle_request_vote(VoteRequest { term: 5, candidate_id: 2 }).await;
        let before = node.snapshot().await.last_contact;

        sleep(Duration::from_millis(5)).await;
        let ack = node.handle_heartbeat(HeartbeatRequest { term: 4, leader_id: 3 }).await;

        assert_eq!(ack.term, 5);
        assert_eq!(node.snapshot().await.last_contact, before);
    }

    #[tokio::test]
    async fn stale_candidate_rejoining_demotes_leader_and_wins_vote() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Grant), (3, Reply::Grant)]));
        {
            let mut state = node.state.lock().await;
            state.current_term = 2;
        }
        assert_eq!(elect(&node).await, ElectionOutcome::BecameLeader);
        assert_eq!(node.term().await, 3);

        let reply = node.handle_request_vote(VoteRequest { term: 5, candidate_id: 2 }).await;

        assert!(reply.vote_granted);
        assert_eq!(reply.term, 5);
        let state = node.snapshot().await;
        assert_eq!(state.role, NodeRole::Follower);
        assert_eq!(state.current_term, 5);
        assert_eq!(state.voted_for, Some(2));
    }

    #[tokio::test]
    async fn leader_heartbeats_every_peer_but_itself() {
        let node = node(3, ScriptedTransport::voting(&[(2, Reply::Grant), (3, Reply::Grant)]));
        assert_eq!(elect(&node).await, ElectionOutcome::BecameLeader);

        assert_eq!(node.broadcast_heartbeats().await, 2);
        sleep(Duration::from_millis(10)).await;

        let calls = node.transport.heartbeat_calls.lock().unwrap().clone();
        let mut peers: Vec<NodeId> = calls.iter().map(|(id, _)| *id).collect();
        peers.sort_unstable();
        assert_eq!(peers, vec![2, 3]);
        assert!(calls.iter().all(|(_, req)| req.term == 1 && req.leader_id == 1));
    }

    #[tokio::test]
    async fn heartbeat_reply_with_higher_term_demotes_leader() {
        let mut transport = ScriptedTransport::voting(&[(2, Reply::Grant), (3, Reply::Grant)]);
        transport.heartbeat_term.insert(3, 7);
        let node = node(3, transport);
        assert_eq!(elect(&node).await, ElectionOutcome::BecameLeader);

        node.broadcast_heartbeats().await;
        sleep(Duration::from_millis(20)).await;

        let state = node.snapshot().await;
        assert_eq!(state.role, NodeRole::Follower);
        assert_eq!(state.current_term, 7);
        // Once demoted, the next sweep sends nothing.
        assert_eq!(node.broadcast_heartbeats().await, 0);
    }

    #[tokio::test]
    async fn status_reports_role_and_vote() {
        let node = node(3, ScriptedTransport::default());
        node.handle_request_vote(VoteRequest { term: 2, candidate_id: 3 }).await;

        let status = node.status().await;
        assert_eq!(status.id, 1);
        assert_eq!(status.term, 2);
        assert_eq!(status.role, NodeRole::Follower);
        assert_eq!(status.voted_for, Some(3));
        assert_eq!(status.leader_id, None);
    }
}

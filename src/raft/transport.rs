use async_trait::async_trait;

use super::{
    HeartbeatRequest, HeartbeatResponse, NodeIdentity, NodeStatus, RaftError, VoteRequest,
    VoteResponse,
};

/// Outbound half of the RPC layer. Implementations only move messages;
/// per-call deadlines are imposed by the caller.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request_vote(
        &self,
        peer: &NodeIdentity,
        request: VoteRequest,
    ) -> Result<VoteResponse, RaftError>;

    async fn heartbeat(
        &self,
        peer: &NodeIdentity,
        request: HeartbeatRequest,
    ) -> Result<HeartbeatResponse, RaftError>;
}

/// Inbound half: what a transport adapter calls when an RPC arrives.
#[async_trait]
pub trait RaftHandler: Send + Sync + 'static {
    async fn handle_request_vote(&self, request: VoteRequest) -> VoteResponse;

    async fn handle_heartbeat(&self, request: HeartbeatRequest) -> HeartbeatResponse;

    /// Snapshot for status queries; also supplies the term used when a
    /// payload could not be decoded.
    async fn status(&self) -> NodeStatus;
}

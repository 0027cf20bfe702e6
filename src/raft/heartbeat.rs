use std::sync::Arc;

use ::log::{debug, info};
use tokio::time::{timeout, Instant};

use super::{HeartbeatRequest, NodeRole, RaftNode, Transport};

impl<T: Transport> RaftNode<T> {
    /// Sends one liveness RPC to every peer. Replies are not awaited here;
    /// a reply carrying a newer term demotes this node when it lands.
    ///
    /// Returns how many sends were dispatched. Stops early once the node is
    /// no longer leader.
    pub(super) async fn broadcast_heartbeats(&self) -> usize {
        let rpc_timeout = self.config().rpc_timeout();
        let mut dispatched = 0;

        for peer in self.config().peers() {
            let term = {
                let mut state = self.state.lock().await;
                if state.role != NodeRole::Leader {
                    debug!(
                        "Node {} no longer leader, stopping heartbeat sweep after {} sends",
                        self.id(),
                        dispatched
                    );
                    break;
                }
                state.last_contact = Instant::now();
                state.current_term
            };

            let request = HeartbeatRequest {
                term,
                leader_id: self.id(),
            };
            let peer = peer.clone();
            let transport = Arc::clone(&self.transport);
            let shared = Arc::clone(&self.state);
            let self_id = self.id();

            tokio::spawn(async move {
                match timeout(rpc_timeout, transport.heartbeat(&peer, request)).await {
                    Ok(Ok(reply)) if reply.term > term => {
                        let mut state = shared.lock().await;
                        if state.observe_term(reply.term) {
                            state.last_contact = Instant::now();
                            info!(
                                "Node {} superseded: peer {} reports term {} (was leader for {})",
                                self_id, peer.id, reply.term, term
                            );
                        }
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => debug!("Heartbeat to peer {} failed: {}", peer.id, e),
                    Err(_) => debug!("Heartbeat to peer {} timed out", peer.id),
                }
            });
            dispatched += 1;
        }

        dispatched
    }
}

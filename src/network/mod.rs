//! HTTP/JSON adapter for the consensus RPCs.
//!
//! Peers are addressed by opaque strings; both `host:port` and
//! `http://host:port/` are accepted.

mod client;
mod error;
mod server;
pub mod wire;

use std::net::{SocketAddr, ToSocketAddrs};

pub use self::client::{fetch_status, HttpTransport};
pub use self::error::NetworkError;
pub use self::server::RaftHttpServer;

pub const VOTE_PATH: &str = "/voteRequest";
pub const HEARTBEAT_PATH: &str = "/heartbeat";
pub const STATUS_PATH: &str = "/status";

/// `host:port` part of a peer address.
pub fn authority(address: &str) -> &str {
    let trimmed = address.trim();
    let without_scheme = trimmed.strip_prefix("http://").unwrap_or(trimmed);
    without_scheme.trim_end_matches('/')
}

pub fn base_url(address: &str) -> String {
    format!("http://{}", authority(address))
}

/// Resolves the address a node should listen on.
pub fn resolve_listen_addr(address: &str) -> Result<SocketAddr, NetworkError> {
    authority(address)
        .to_socket_addrs()
        .map_err(|e| NetworkError::InvalidAddress(format!("{address}: {e}")))?
        .next()
        .ok_or_else(|| NetworkError::InvalidAddress(address.to_string()))
}

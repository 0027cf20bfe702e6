// Consensus core
pub mod raft;
pub mod storage;

// Process surface
pub mod config;
pub mod network;

// Public exports
pub use config::Config;
pub use network::{HttpTransport, RaftHttpServer};
pub use raft::{NodeRole, RaftConfig, RaftHandler, RaftNode, Transport};
pub use storage::{CsvLogStore, LogStore};

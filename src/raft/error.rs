use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(u64),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Log store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Timeout")]
    Timeout,
}

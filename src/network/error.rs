use thiserror::Error;

use crate::raft::RaftError;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    HyperError(#[from] hyper::Error),

    #[error("Request build error: {0}")]
    RequestError(#[from] hyper::http::Error),

    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<NetworkError> for RaftError {
    fn from(err: NetworkError) -> Self {
        RaftError::NetworkError(err.to_string())
    }
}

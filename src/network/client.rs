use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{self, HeaderValue};
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::wire::{HeartbeatAckBody, HeartbeatBody, VoteRequestBody, VoteResponseBody};
use super::{base_url, NetworkError, HEARTBEAT_PATH, STATUS_PATH, VOTE_PATH};
use crate::raft::{
    HeartbeatRequest, HeartbeatResponse, NodeIdentity, NodeStatus, RaftError, Transport,
    VoteRequest, VoteResponse,
};

/// Outbound RPCs over HTTP/1.1 with JSON bodies.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);
        Self {
            client: Client::builder().build(connector),
        }
    }

    async fn post_json<Req, Resp>(
        &self,
        address: &str,
        path: &str,
        body: &Req,
    ) -> Result<Resp, NetworkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let uri: Uri = format!("{}{}", base_url(address), path).parse()?;
        let payload = serde_json::to_vec(body)?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Body::from(payload))?;

        let resp = self.client.request(req).await?;
        let status = resp.status();
        // A 400 still carries a well-formed deny/ack with the peer's term.
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            return Err(NetworkError::UnexpectedStatus(status.as_u16()));
        }
        let bytes = hyper::body::to_bytes(resp.into_body()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request_vote(
        &self,
        peer: &NodeIdentity,
        request: VoteRequest,
    ) -> Result<VoteResponse, RaftError> {
        let body: VoteResponseBody = self
            .post_json(&peer.address, VOTE_PATH, &VoteRequestBody::from(request))
            .await?;
        VoteResponse::try_from(body)
            .map_err(|e| RaftError::from(NetworkError::MalformedReply(e)))
    }

    async fn heartbeat(
        &self,
        peer: &NodeIdentity,
        request: HeartbeatRequest,
    ) -> Result<HeartbeatResponse, RaftError> {
        let body: HeartbeatAckBody = self
            .post_json(&peer.address, HEARTBEAT_PATH, &HeartbeatBody::from(request))
            .await?;
        Ok(HeartbeatResponse::from(body))
    }
}

/// Fetches `/status` from a running node.
pub async fn fetch_status(address: &str) -> Result<NodeStatus, NetworkError> {
    let uri: Uri = format!("{}{}", base_url(address), STATUS_PATH).parse()?;
    let client = Client::new();
    let resp = client.get(uri).await?;
    if !resp.status().is_success() {
        return Err(NetworkError::UnexpectedStatus(resp.status().as_u16()));
    }
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

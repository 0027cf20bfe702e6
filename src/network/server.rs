use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::HttpBody as _;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{debug, info, warn};
use serde::Serialize;

use super::wire::{self, HeartbeatAckBody, VoteResponseBody};
use super::{NetworkError, HEARTBEAT_PATH, STATUS_PATH, VOTE_PATH};
use crate::raft::{HeartbeatResponse, RaftHandler, VoteResponse};

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Inbound RPC endpoint. Binding and serving are split so a node can fail
/// fast on an unusable address before it touches storage.
pub struct RaftHttpServer {
    incoming: AddrIncoming,
    local_addr: SocketAddr,
}

impl RaftHttpServer {
    /// Binds `addr` right away. Must be called inside a tokio runtime. An
    /// address already in use surfaces as [`NetworkError::IoError`].
    pub fn bind(addr: &SocketAddr) -> Result<Self, NetworkError> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(listener)?;
        let incoming = AddrIncoming::from_listener(listener)?;
        let local_addr = incoming.local_addr();
        Ok(Self {
            incoming,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn serve(self, handler: Arc<dyn RaftHandler>) -> Result<(), NetworkError> {
        let make_svc = make_service_fn(move |_conn| {
            let handler = Arc::clone(&handler);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let handler = Arc::clone(&handler);
                    async move { handle(req, handler).await }
                }))
            }
        });

        info!("RPC server listening on {}", self.local_addr);
        hyper::Server::builder(self.incoming)
            .serve(make_svc)
            .await?;
        Ok(())
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            resp
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn json_error(status: StatusCode, msg: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": msg }).to_string();
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

enum ReadBodyLimitedError {
    TooLarge,
    Hyper(hyper::Error),
}

impl From<hyper::Error> for ReadBodyLimitedError {
    fn from(e: hyper::Error) -> Self {
        Self::Hyper(e)
    }
}

async fn read_body_limited(
    mut body: Body,
    max_bytes: usize,
) -> Result<Vec<u8>, ReadBodyLimitedError> {
    let mut out = Vec::new();
    while let Some(next) = body.data().await {
        let chunk = next?;
        if out.len() + chunk.len() > max_bytes {
            return Err(ReadBodyLimitedError::TooLarge);
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Reads the request body, or explains why it could not be read.
async fn read_payload(req: Request<Body>) -> Result<Vec<u8>, String> {
    match read_body_limited(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => Ok(bytes),
        Err(ReadBodyLimitedError::TooLarge) => {
            Err(format!("payload exceeds {MAX_BODY_BYTES} bytes"))
        }
        Err(ReadBodyLimitedError::Hyper(e)) => Err(e.to_string()),
    }
}

async fn handle(
    req: Request<Body>,
    handler: Arc<dyn RaftHandler>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{} {}", method, path);

    let response = match (method, path.as_str()) {
        (Method::POST, VOTE_PATH) => {
            let decoded = match read_payload(req).await {
                Ok(bytes) => wire::decode_vote_request(&bytes),
                Err(e) => Err(e),
            };
            match decoded {
                Ok(request) => {
                    let reply = handler.handle_request_vote(request).await;
                    json_response(StatusCode::OK, &VoteResponseBody::from(reply))
                }
                Err(e) => {
                    warn!("Malformed vote request: {}", e);
                    let term = handler.status().await.term;
                    let deny = VoteResponse {
                        term,
                        vote_granted: false,
                    };
                    json_response(StatusCode::BAD_REQUEST, &VoteResponseBody::from(deny))
                }
            }
        }
        (Method::POST, HEARTBEAT_PATH) => {
            let decoded = match read_payload(req).await {
                Ok(bytes) => wire::decode_heartbeat(&bytes),
                Err(e) => Err(e),
            };
            match decoded {
                Ok(request) => {
                    let reply = handler.handle_heartbeat(request).await;
                    json_response(StatusCode::OK, &HeartbeatAckBody::from(reply))
                }
                Err(e) => {
                    warn!("Malformed heartbeat: {}", e);
                    let term = handler.status().await.term;
                    json_response(
                        StatusCode::BAD_REQUEST,
                        &HeartbeatAckBody::from(HeartbeatResponse { term }),
                    )
                }
            }
        }
        (Method::GET, STATUS_PATH) => json_response(StatusCode::OK, &handler.status().await),
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

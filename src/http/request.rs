//! Request identification and relay context.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every inbound request
//! - Capture what a forwarded request needs (target, headers, peer)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing, and relayed
//!   upstream with the other headers
//! - The relay context lives only for one request; nothing is shared

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderMap, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Per-request data handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct RelayContext {
    /// Path plus `?query` when present.
    pub target: String,
    pub headers: HeaderMap,
    pub client: SocketAddr,
}

impl RelayContext {
    pub fn new(uri: &Uri, headers: HeaderMap, client: SocketAddr) -> Self {
        Self {
            target: path_and_query(uri),
            headers,
            client,
        }
    }

    pub fn client_ip(&self) -> IpAddr {
        self.client.ip()
    }

    pub fn request_id(&self) -> &str {
        self.headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// The path and query of a URI, as forwarded upstream.
pub fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

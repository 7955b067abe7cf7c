//! Response shaping for the client surface.
//!
//! # Responsibilities
//! - Relay an upstream answer: status, headers, body byte for byte
//! - Build the proxy's own terminal responses (403, 413, 503)
//!
//! # Design Decisions
//! - Connection-scoped framing headers are not relayed; the client
//!   connection frames the buffered body itself
//! - Proxy-generated rejections carry an empty body

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;

use crate::upstream::headers::relayed_headers;
use crate::upstream::UpstreamResponse;

/// Turn an upstream answer into the client response.
pub fn relay(upstream: UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = relayed_headers(&upstream.headers);
    response
}

/// A response with the given status and no body.
pub fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Gated request from a source outside the allowlist.
pub fn forbidden() -> Response {
    empty(StatusCode::FORBIDDEN)
}

/// Upstream unreachable or every attempt failed.
pub fn unavailable() -> Response {
    empty(StatusCode::SERVICE_UNAVAILABLE)
}

/// Request body larger than the configured limit.
pub fn payload_too_large() -> Response {
    empty(StatusCode::PAYLOAD_TOO_LARGE)
}

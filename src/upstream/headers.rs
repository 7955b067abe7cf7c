//! Header relay rules.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before forwarding a request upstream
//! - Strip connection-scoped framing headers from relayed responses
//!
//! # Design Decisions
//! - `content-length` is dropped on the way up: the body is buffered and
//!   the client connection recomputes framing
//! - Headers named in `Connection` are treated as hop-by-hop too
//! - Multi-valued headers keep every value, in order

use axum::http::header::{self, HeaderMap, HeaderName};

/// Headers that only describe one transport leg.
pub static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// Response headers that are recomputed by the proxy's own connection.
static RESPONSE_FRAMING: [HeaderName; 4] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TRANSFER_ENCODING,
];

fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect()
}

/// Copy of `headers` fit to send upstream.
pub fn outbound_headers(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(headers);
    let mut out = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        let skip = *name == header::CONTENT_LENGTH
            || *name == header::TRANSFER_ENCODING
            || HOP_BY_HOP.contains(name)
            || listed.contains(name);
        if !skip {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Copy of upstream response headers fit to relay to the client.
pub fn relayed_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !RESPONSE_FRAMING.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

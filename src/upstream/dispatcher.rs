//! Calls to the fixed upstream origin.
//!
//! # Responsibilities
//! - Rewrite the inbound path and query onto the upstream origin
//! - Relay method, filtered headers and body
//! - Buffer the full upstream answer under the read deadline
//! - Retry gated writes through the injected `RetryPolicy`
//!
//! # Design Decisions
//! - Reads get exactly one attempt; a failure surfaces directly
//! - Any well-formed answer, whatever its status, is a success here;
//!   only transport-level failures count against the retry budget

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::resilience::{Exhausted, RetryPolicy, Retryable};
use crate::upstream::headers::outbound_headers;

/// Failure of a single upstream call.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid upstream origin '{0}'")]
    InvalidOrigin(String),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("failed to read upstream body: {0}")]
    Body(#[source] axum::Error),
}

impl Retryable for DispatchError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Transport(_) | DispatchError::Timeout(_) | DispatchError::Body(_)
        )
    }
}

/// A complete upstream answer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forwards requests to the upstream origin.
#[derive(Clone)]
pub struct UpstreamDispatcher {
    client: Client<HttpConnector, Body>,
    origin: String,
    read_timeout: Duration,
    retry: RetryPolicy,
}

impl UpstreamDispatcher {
    /// Build a dispatcher for the configured origin.
    pub fn new(config: &UpstreamConfig, retry: RetryPolicy) -> Result<Self, DispatchError> {
        let origin = origin_of(&config.base_url)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            origin,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            retry,
        })
    }

    /// Forward a read. One attempt, no retry.
    pub async fn forward_read(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse, DispatchError> {
        let result = self.send_once(method, path_and_query, headers, Body::empty()).await;
        record_attempt(&result);
        result
    }

    /// Forward a gated write, retrying transport failures.
    pub async fn forward_write(
        &self,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, Exhausted<DispatchError>> {
        self.retry
            .run(|attempt| {
                let body = body.clone();
                async move {
                    let result = self
                        .send_once(Method::POST, path_and_query, headers, Body::from(body))
                        .await;
                    record_attempt(&result);
                    if let Err(e) = &result {
                        tracing::warn!(attempt, path = %path_and_query, error = %e, "Upstream write attempt failed");
                    }
                    result
                }
            })
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<UpstreamResponse, DispatchError> {
        let uri = self.target_uri(path_and_query)?;
        let mut request = Request::builder().method(method).uri(uri).body(body)?;
        *request.headers_mut() = outbound_headers(headers);

        match tokio::time::timeout(self.read_timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.read_timeout)),
        }
    }

    async fn exchange(&self, request: Request<Body>) -> Result<UpstreamResponse, DispatchError> {
        let response = self.client.request(request).await?;
        collect(response).await
    }

    fn target_uri(&self, path_and_query: &str) -> Result<Uri, DispatchError> {
        let path_and_query = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };
        let uri = format!("{}{}", self.origin, path_and_query)
            .parse::<Uri>()
            .map_err(axum::http::Error::from)?;
        Ok(uri)
    }
}

async fn collect(response: axum::http::Response<Incoming>) -> Result<UpstreamResponse, DispatchError> {
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(Body::new(body), usize::MAX)
        .await
        .map_err(DispatchError::Body)?;
    Ok(UpstreamResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}

fn record_attempt<T>(result: &Result<T, DispatchError>) {
    metrics::record_upstream_attempt(if result.is_ok() { "success" } else { "failure" });
}

/// Reduce a base URL to `http://host[:port]`.
fn origin_of(base_url: &str) -> Result<String, DispatchError> {
    let invalid = || DispatchError::InvalidOrigin(base_url.to_string());
    let url = Url::parse(base_url).map_err(|_| invalid())?;
    if url.scheme() != "http" {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;
    Ok(match url.port() {
        Some(port) => format!("http://{host}:{port}"),
        None => format!("http://{host}"),
    })
}

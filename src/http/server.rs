//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the read-through and gated write-through families
//! - Wire up middleware (tracing, timeout, request ID)
//! - Gate writes on the allowlist before any upstream call
//! - Map dispatcher outcomes to client-visible status codes
//! - Spawn the allowlist refresher next to the listener
//!
//! # Request State Machine
//! ```text
//! GET/HEAD  Received → Dispatching → Relaying → Done
//!                          └─ failure → Unavailable(503)
//! POST      Received → CheckingAllowlist → Dispatching → Relaying → Done
//!                          ├─ not listed → Rejected(403)
//!                          └─ exhausted  → Unavailable(503)
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request},
    response::Response,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::allowlist::{Allowlist, AllowlistCompiler, AllowlistRefresher, CompiledAllowlist, RefreshError};
use crate::config::ProxyConfig;
use crate::http::request::{RelayContext, UuidRequestId};
use crate::http::response;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::upstream::{DispatchError, UpstreamDispatcher};

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("upstream setup failed: {0}")]
    Upstream(#[from] DispatchError),

    #[error("allowlist feed setup failed: {0}")]
    Feed(#[from] RefreshError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub allowlist: Arc<Allowlist>,
    pub dispatcher: Arc<UpstreamDispatcher>,
    pub max_body_size: usize,
}

impl AppState {
    /// Build handler state around an existing allowlist.
    pub fn new(config: &ProxyConfig, allowlist: Arc<Allowlist>) -> Result<Self, ServerError> {
        let retry = RetryPolicy::from_config(&config.retries);
        let dispatcher = UpstreamDispatcher::new(&config.upstream, retry)?;
        Ok(Self {
            allowlist,
            dispatcher: Arc::new(dispatcher),
            max_body_size: config.security.max_body_size,
        })
    }
}

/// HTTP server for the allowlist proxy.
pub struct HttpServer {
    router: Router,
    allowlist: Arc<Allowlist>,
    refresher: Option<AllowlistRefresher>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// The allowlist starts empty; it is filled by the refresher once `run`
    /// is called, or pinned to loopback when no feed is configured.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let allowlist = Arc::new(Allowlist::new());

        let refresher = match &config.allowlist.feed_url {
            Some(_) => {
                let compiler = AllowlistCompiler::new(&config.allowlist)?;
                Some(AllowlistRefresher::new(
                    compiler,
                    allowlist.clone(),
                    Duration::from_secs(config.allowlist.refresh_interval_secs),
                ))
            }
            None => {
                tracing::warn!("No allowlist feed configured; only loopback may write");
                allowlist.replace(CompiledAllowlist::loopback_only().ranges);
                None
            }
        };

        let state = AppState::new(&config, allowlist.clone())?;
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            allowlist,
            refresher,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Write bodies are size-checked inside the handler, after the
    /// allowlist gate, so unlisted sources always see 403.
    #[allow(deprecated)]
    pub fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", get(read_through).post(write_through))
            .route("/", get(read_through).post(write_through))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Shared allowlist handle.
    pub fn allowlist(&self) -> Arc<Allowlist> {
        self.allowlist.clone()
    }

    /// Run the server until a shutdown signal arrives.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(refresher) = self.refresher {
            let refresher_shutdown = shutdown.subscribe();
            tokio::spawn(async move {
                refresher.run(refresher_shutdown).await;
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut server_shutdown = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Open read family: forwarded regardless of source address.
async fn read_through(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let (parts, _body) = request.into_parts();
    let method = parts.method;
    let ctx = RelayContext::new(&parts.uri, parts.headers, client);

    tracing::debug!(
        request_id = %ctx.request_id(),
        method = %method,
        target = %ctx.target,
        "Proxying read"
    );

    let response = match state
        .dispatcher
        .forward_read(method.clone(), &ctx.target, &ctx.headers)
        .await
    {
        Ok(upstream) => response::relay(upstream),
        Err(e) => {
            tracing::error!(request_id = %ctx.request_id(), target = %ctx.target, error = %e, "Upstream read failed");
            response::unavailable()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), "read", start);
    response
}

/// Gated write family: source address must be on the allowlist.
async fn write_through(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let ctx = RelayContext::new(&parts.uri, parts.headers, client);

    let response = gate_and_forward(&state, &ctx, body).await;

    metrics::record_request(Method::POST.as_str(), response.status().as_u16(), "write", start);
    response
}

async fn gate_and_forward(state: &AppState, ctx: &RelayContext, body: Body) -> Response {
    // The lock is released before any upstream I/O.
    if !state.allowlist.check(ctx.client_ip()) {
        tracing::info!(client = %ctx.client_ip(), target = %ctx.target, "Access rejected");
        metrics::record_access_denied();
        return response::forbidden();
    }

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id(), error = %e, "Failed to read request body");
            return response::payload_too_large();
        }
    };

    tracing::debug!(
        request_id = %ctx.request_id(),
        client = %ctx.client_ip(),
        target = %ctx.target,
        bytes = body.len(),
        "Proxying write"
    );

    match state.dispatcher.forward_write(&ctx.target, &ctx.headers, body).await {
        Ok(upstream) => response::relay(upstream),
        Err(exhausted) => {
            tracing::error!(
                request_id = %ctx.request_id(),
                target = %ctx.target,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "Upstream write exhausted"
            );
            response::unavailable()
        }
    }
}

//! Allowlist-gated reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                 ALLOWLIST PROXY                   │
//!                         │                                                   │
//!    GET  /*  ────────────┼──▶ read_through ───────────────┐                  │
//!                         │                                 ▼                  │
//!                         │                         ┌──────────────┐          │
//!    POST /*  ────────────┼──▶ write_through ──▶ ✓ ─▶│  upstream    │──────────┼──▶ Upstream
//!                         │        │ allowlist?      │  dispatcher  │          │    origin
//!                         │        ✗ 403             │ (+ retries)  │          │
//!                         │                          └──────────────┘          │
//!                         │        ▲                                           │
//!                         │  ┌─────┴──────┐    ┌────────────┐                  │
//!                         │  │ Allowlist  │◀───│ refresher  │◀─────────────────┼──── Policy feed
//!                         │  │ (1 mutex)  │    │ (periodic) │                  │
//!                         │  └────────────┘    └────────────┘                  │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use allowlist_proxy::config::{load_config, ProxyConfig};
use allowlist_proxy::lifecycle::spawn_signal_listener;
use allowlist_proxy::observability::{logging, metrics};
use allowlist_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "allowlist-proxy")]
#[command(about = "Reverse proxy that gates writes on a remote IP allowlist", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);

    tracing::info!("allowlist-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        feed = ?config.allowlist.feed_url,
        refresh_interval_secs = config.allowlist.refresh_interval_secs,
        max_attempts = config.retries.max_attempts,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Scheduled allowlist refresh.
//!
//! # Responsibilities
//! - Drive the compiler on a fixed period, first run immediately
//! - Swap successful results into the shared allowlist
//! - Contain failures: log them, keep the previous snapshot
//!
//! # Design Decisions
//! - A failure before any snapshot exists installs the loopback-only
//!   baseline so local callers are never locked out
//! - No cancellation mid-refresh; shutdown is observed between ticks

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::allowlist::compiler::{AllowlistCompiler, RefreshError};
use crate::allowlist::feed::CompiledAllowlist;
use crate::allowlist::Allowlist;
use crate::observability::metrics;

/// Background task keeping the allowlist current.
pub struct AllowlistRefresher {
    compiler: AllowlistCompiler,
    allowlist: Arc<Allowlist>,
    interval: Duration,
}

impl AllowlistRefresher {
    pub fn new(compiler: AllowlistCompiler, allowlist: Arc<Allowlist>, interval: Duration) -> Self {
        Self {
            compiler,
            allowlist,
            interval,
        }
    }

    /// Run one refresh cycle, returning the new allowlist size on success.
    ///
    /// Errors are returned for the caller's information only; the shared
    /// allowlist has already been left in a consistent state.
    pub async fn refresh_once(&self) -> Result<usize, RefreshError> {
        match self.compiler.refresh().await {
            Ok(compiled) => {
                let size = self.allowlist.replace(compiled.ranges);
                metrics::record_allowlist_refresh("success");
                metrics::record_allowlist_size(size);
                tracing::info!(size, skipped = compiled.skipped, "IP allowlist updated successfully");
                Ok(size)
            }
            Err(e) => {
                metrics::record_allowlist_refresh("failure");
                tracing::warn!(url = %self.compiler.feed_url(), error = %e, "Could not obtain IP allowlist");
                if self.allowlist.is_empty() {
                    let size = self.allowlist.replace(CompiledAllowlist::loopback_only().ranges);
                    metrics::record_allowlist_size(size);
                    tracing::info!("Installed loopback-only allowlist until the feed is reachable");
                }
                Err(e)
            }
        }
    }

    /// Refresh on every tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            url = %self.compiler.feed_url(),
            interval_secs = self.interval.as_secs(),
            "Allowlist refresher starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.refresh_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Allowlist refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

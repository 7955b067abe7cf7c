//! Remote feed download and compilation.
//!
//! # Responsibilities
//! - Fetch the policy feed with bounded connect/read timeouts
//! - Treat transport failures and non-200 answers as refresh errors
//! - Hand the body to the feed compiler
//!
//! # Design Decisions
//! - Fail fast rather than hang the scheduled job
//! - The compiler never touches the shared allowlist; swapping is the
//!   caller's job so a failed download cannot disturb the live set

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::allowlist::feed::{compile, CompiledAllowlist};
use crate::config::AllowlistConfig;

/// Errors that abort a refresh.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// No feed URL configured.
    #[error("no allowlist feed configured")]
    NoFeed,

    /// The HTTP client could not be built.
    #[error("failed to build feed client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, timeout or protocol failure.
    #[error("feed request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The feed answered with something other than 200.
    #[error("feed answered with status {0}")]
    Status(StatusCode),

    /// The body could not be read in full.
    #[error("failed to read feed body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Downloads the feed and compiles it.
#[derive(Debug, Clone)]
pub struct AllowlistCompiler {
    client: reqwest::Client,
    feed_url: String,
}

impl AllowlistCompiler {
    /// Build a compiler for the configured feed.
    pub fn new(config: &AllowlistConfig) -> Result<Self, RefreshError> {
        let feed_url = config.feed_url.clone().ok_or(RefreshError::NoFeed)?;
        Self::with_url(
            feed_url,
            Duration::from_millis(config.connect_timeout_ms),
            Duration::from_millis(config.read_timeout_ms),
        )
    }

    /// Build a compiler for an explicit URL and timeouts.
    pub fn with_url(
        feed_url: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, RefreshError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .timeout(connect_timeout + read_timeout)
            .user_agent(concat!("allowlist-proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RefreshError::Client)?;

        Ok(Self {
            client,
            feed_url: feed_url.into(),
        })
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Download the raw feed text.
    pub async fn fetch(&self) -> Result<String, RefreshError> {
        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .map_err(RefreshError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RefreshError::Status(status));
        }

        response.text().await.map_err(RefreshError::Body)
    }

    /// Download and compile. The result always contains loopback.
    pub async fn refresh(&self) -> Result<CompiledAllowlist, RefreshError> {
        tracing::info!(url = %self.feed_url, "Downloading IP allowlist");
        let body = self.fetch().await?;
        let compiled = compile(&body);
        if compiled.skipped > 0 {
            tracing::debug!(skipped = compiled.skipped, "Feed contained unusable tokens");
        }
        Ok(compiled)
    }
}

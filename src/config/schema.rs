//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the allowlist proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (client-facing bind address).
    pub listener: ListenerConfig,

    /// The single upstream origin every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Remote allowlist feed and refresh schedule.
    pub allowlist: AllowlistConfig,

    /// Retry configuration for gated writes.
    pub retries: RetryConfig,

    /// Timeout configuration for the client surface.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3637").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3637".to_string(),
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream (scheme, host and port only).
    pub base_url: String,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Time allowed for the response, body included, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5141".to_string(),
            connect_timeout_ms: 1000,
            read_timeout_ms: 6000,
        }
    }
}

/// Allowlist feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AllowlistConfig {
    /// URL of the plain-text policy feed. When unset only loopback is allowed.
    pub feed_url: Option<String>,

    /// Refresh period in seconds.
    pub refresh_interval_secs: u64,

    /// Feed connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Feed read timeout in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            refresh_interval_secs: 24 * 60 * 60,
            connect_timeout_ms: 1000,
            read_timeout_ms: 6000,
        }
    }
}

/// Timeout configuration for the client surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts for a gated write (first try included).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds. Zero disables backoff.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum gated request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3637");
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:5141");
        assert_eq!(config.allowlist.refresh_interval_secs, 86_400);
        assert_eq!(config.retries.max_attempts, 3);
        assert!(config.allowlist.feed_url.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [allowlist]
            feed_url = "https://example.com/regions.txt"
            refresh_interval_secs = 3600

            [retries]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.allowlist.feed_url.as_deref(), Some("https://example.com/regions.txt"));
        assert_eq!(config.allowlist.refresh_interval_secs, 3600);
        assert_eq!(config.allowlist.read_timeout_ms, 6000);
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.retries.base_delay_ms, 0);
    }
}

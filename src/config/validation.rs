//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs (upstream origin, allowlist feed)
//! - Validate value ranges (timeouts > 0, attempts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidSocketAddr { field: &'static str, value: String },

    #[error("{field}: '{value}' is not a valid URL ({reason})")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field}: scheme '{scheme}' is not supported")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("retries.max_delay_ms ({max}) is lower than retries.base_delay_ms ({base})")]
    BackoffBounds { base: u64, max: u64 },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_url(&mut errors, "upstream.base_url", &config.upstream.base_url, &["http"]);
    if let Some(feed_url) = &config.allowlist.feed_url {
        check_url(&mut errors, "allowlist.feed_url", feed_url, &["http", "https"]);
    }

    let non_zero = [
        ("upstream.connect_timeout_ms", config.upstream.connect_timeout_ms),
        ("upstream.read_timeout_ms", config.upstream.read_timeout_ms),
        ("allowlist.refresh_interval_secs", config.allowlist.refresh_interval_secs),
        ("allowlist.connect_timeout_ms", config.allowlist.connect_timeout_ms),
        ("allowlist.read_timeout_ms", config.allowlist.read_timeout_ms),
        ("retries.max_attempts", u64::from(config.retries.max_attempts)),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("security.max_body_size", config.security.max_body_size as u64),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::BackoffBounds {
            base: config.retries.base_delay_ms,
            max: config.retries.max_delay_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddr {
            field,
            value: value.to_string(),
        });
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str, schemes: &[&str]) {
    match Url::parse(value) {
        Ok(url) if !schemes.contains(&url.scheme()) => {
            errors.push(ValidationError::UnsupportedScheme {
                field,
                scheme: url.scheme().to_string(),
            });
        }
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::InvalidUrl {
                field,
                value: value.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

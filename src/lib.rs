//! Allowlist-gated reverse proxy library.
//!
//! Reads are forwarded to a fixed upstream for anyone; writes only for
//! source addresses on an allowlist compiled from a remote text feed and
//! refreshed in the background.

pub mod allowlist;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use allowlist::{AddressRange, Allowlist};
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

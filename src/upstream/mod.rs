//! Upstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Handler (read or gated write)
//!     → headers.rs (drop hop-by-hop headers)
//!     → dispatcher.rs (one call, or RetryPolicy-driven calls for writes)
//!     → UpstreamResponse (status, headers, full body)
//! ```

pub mod dispatcher;
pub mod headers;

pub use dispatcher::{DispatchError, UpstreamDispatcher, UpstreamResponse};

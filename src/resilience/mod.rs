//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gated write to upstream:
//!     → retries.rs (RetryPolicy::run drives attempts)
//!     → On retryable failure: backoff.rs (optional delay), try again
//!     → Out of attempts: Exhausted
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - The policy knows nothing about HTTP; errors classify themselves
//!   through the `Retryable` trait

pub mod backoff;
pub mod retries;

pub use retries::{Exhausted, RetryPolicy, Retryable};

//! Source-address allowlist subsystem.
//!
//! # Data Flow
//! ```text
//! Refresh task (refresh.rs, fixed period):
//!     → compiler.rs (GET feed with connect/read timeouts)
//!     → feed.rs (scan quoted tokens, expand spans, add loopback)
//!     → Allowlist::replace (swap under the lock)
//!
//! Gated request:
//!     → Allowlist::check (scan under the same lock, released before dispatch)
//! ```
//!
//! # Design Decisions
//! - One exclusive lock guards the set; refreshes are rare next to checks
//! - A refresh is built off to the side and swapped whole, never merged
//! - A failed refresh leaves the previous snapshot untouched

pub mod compiler;
pub mod feed;
pub mod range;
pub mod refresh;

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use compiler::{AllowlistCompiler, RefreshError};
pub use feed::{compile, CompiledAllowlist};
pub use range::{AddressRange, ParseError};
pub use refresh::AllowlistRefresher;

/// Process-wide set of permitted source ranges.
///
/// Created empty; every gated request is rejected until the first refresh
/// installs a snapshot.
#[derive(Debug, Default)]
pub struct Allowlist {
    ranges: Mutex<HashSet<AddressRange>>,
}

impl Allowlist {
    /// Create an empty allowlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allowlist pre-populated with the given ranges.
    pub fn with_ranges(ranges: impl IntoIterator<Item = AddressRange>) -> Self {
        Self {
            ranges: Mutex::new(ranges.into_iter().collect()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<AddressRange>> {
        // The set is only ever assigned whole, so a poisoned guard still
        // holds a complete snapshot.
        self.ranges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Is this address currently permitted?
    pub fn check(&self, address: IpAddr) -> bool {
        self.lock().iter().any(|range| range.contains(address))
    }

    /// Text variant of [`check`](Self::check); unparsable input is denied.
    pub fn check_str(&self, address: &str) -> bool {
        address
            .trim()
            .parse::<IpAddr>()
            .map(|ip| self.check(ip))
            .unwrap_or(false)
    }

    /// Swap in a freshly compiled set, returning the new size.
    pub fn replace(&self, ranges: HashSet<AddressRange>) -> usize {
        let len = ranges.len();
        *self.lock() = ranges;
        len
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> HashSet<AddressRange> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

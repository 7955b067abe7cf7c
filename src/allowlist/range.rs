//! Allowlist entries: a single IPv4 host or a CIDR block.
//!
//! # Design Decisions
//! - Entries are immutable values; equality is (base address, prefix length),
//!   so a `HashSet` of ranges deduplicates naturally
//! - The base address is stored as written, masking happens at match time
//! - Octets are parsed loosely (1-4 digits, leading zeros allowed) because
//!   the feed is not validated upstream, but each octet must still fit 0-255

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a feed token into an [`AddressRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected 4 dot-separated octets, found {0}")]
    OctetCount(usize),

    #[error("octet '{0}' is not a 1-4 digit decimal number")]
    NotNumeric(String),

    #[error("octet {0} is out of range (0-255)")]
    OctetOutOfRange(u32),

    #[error("prefix length '{0}' is not a number in 0-32")]
    InvalidPrefix(String),
}

/// A single allowlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressRange {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl AddressRange {
    /// Longest prefix; a range of this length matches exactly one host.
    pub const HOST_PREFIX: u8 = 32;

    /// The loopback entry that every compiled allowlist carries.
    pub const LOOPBACK: AddressRange = AddressRange {
        base: Ipv4Addr::LOCALHOST,
        prefix_len: Self::HOST_PREFIX,
    };

    /// A single-host range.
    pub fn host(base: Ipv4Addr) -> Self {
        Self {
            base,
            prefix_len: Self::HOST_PREFIX,
        }
    }

    /// Parse an address token and an optional prefix-length token.
    ///
    /// A missing prefix means a single host (`/32`).
    pub fn parse(address: &str, prefix: Option<&str>) -> Result<Self, ParseError> {
        let base = parse_octets(address)?;
        let prefix_len = match prefix {
            None => Self::HOST_PREFIX,
            Some(text) => parse_prefix(text)?,
        };
        Ok(Self { base, prefix_len })
    }

    /// Base address as written in the feed.
    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// True if the candidate falls inside this range.
    ///
    /// IPv4-mapped IPv6 candidates are matched as IPv4; any other IPv6
    /// address is never a member.
    pub fn contains(&self, candidate: IpAddr) -> bool {
        match to_ipv4(candidate) {
            Some(v4) => self.contains_v4(v4),
            None => false,
        }
    }

    /// IPv4 containment: both sides masked to the prefix must be equal.
    pub fn contains_v4(&self, candidate: Ipv4Addr) -> bool {
        let mask = prefix_mask(self.prefix_len);
        u32::from(candidate) & mask == u32::from(self.base) & mask
    }

    /// Like [`contains`](Self::contains) but for untrusted text.
    ///
    /// Anything that is not an IP address is simply not a member.
    pub fn contains_str(&self, candidate: &str) -> bool {
        candidate
            .trim()
            .parse::<IpAddr>()
            .map(|ip| self.contains(ip))
            .unwrap_or(false)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

impl FromStr for AddressRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((address, prefix)) => Self::parse(address, Some(prefix)),
            None => Self::parse(s, None),
        }
    }
}

/// Normalize a peer address to IPv4 if possible.
pub(crate) fn to_ipv4(candidate: IpAddr) -> Option<Ipv4Addr> {
    match candidate {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

/// Parse `a.b.c.d` where each octet is 1-4 ASCII digits with value <= 255.
pub(crate) fn parse_octets(text: &str) -> Result<Ipv4Addr, ParseError> {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() != 4 {
        return Err(ParseError::OctetCount(parts.len()));
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 4 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::NotNumeric((*part).to_string()));
        }
        let value: u32 = part
            .parse()
            .map_err(|_| ParseError::NotNumeric((*part).to_string()))?;
        *slot = u8::try_from(value).map_err(|_| ParseError::OctetOutOfRange(value))?;
    }

    Ok(Ipv4Addr::from(octets))
}

fn parse_prefix(text: &str) -> Result<u8, ParseError> {
    if text.is_empty() || text.len() > 3 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPrefix(text.to_string()));
    }
    match text.parse::<u8>() {
        Ok(n) if n <= AddressRange::HOST_PREFIX => Ok(n),
        _ => Err(ParseError::InvalidPrefix(text.to_string())),
    }
}

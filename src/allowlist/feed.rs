//! Policy feed tokenizer and compiler.
//!
//! The feed is loosely structured text. The only content that matters is
//! double-quoted tokens of two shapes:
//!
//! ```text
//! "a.b.c.d"            single host
//! "a.b.c.d/nn"         CIDR block
//! "a.b.c.x-a.b.c.y"    span over the final octet, expanded to hosts
//! ```
//!
//! Everything else, and every line containing `//`, is ignored.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::allowlist::range::{parse_octets, AddressRange, ParseError};

/// Marker that disqualifies a whole line.
pub const COMMENT_MARKER: &str = "//";

/// A quoted token recognised on a feed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedToken<'a> {
    /// `"address"` or `"address/prefix"`.
    Single {
        address: &'a str,
        prefix: Option<&'a str>,
    },
    /// `"start-end"`.
    Span { start: &'a str, end: &'a str },
}

/// Result of compiling a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledAllowlist {
    /// Deduplicated entries, loopback always included.
    pub ranges: HashSet<AddressRange>,
    /// Tokens that were recognised but rejected.
    pub skipped: usize,
}

impl CompiledAllowlist {
    /// The allowlist of an empty feed: loopback only.
    pub fn loopback_only() -> Self {
        Self {
            ranges: HashSet::from([AddressRange::LOOPBACK]),
            skipped: 0,
        }
    }

    /// Entries in a stable order, for display.
    pub fn sorted(&self) -> Vec<AddressRange> {
        let mut ranges: Vec<_> = self.ranges.iter().copied().collect();
        ranges.sort();
        ranges
    }
}

/// Why a span token produced no entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanSkip {
    Malformed(ParseError),
    /// The first three octets of start and end differ.
    PrefixMismatch,
    /// The final octet of start is greater than the final octet of end.
    Inverted,
}

/// Scan one line for quoted tokens.
///
/// Comment lines yield nothing. Scanning resumes after the closing quote
/// of a recognised token, or at the closing quote of an unrecognised one
/// (which may open the next token).
pub fn scan_line(line: &str) -> Vec<FeedToken<'_>> {
    let mut tokens = Vec::new();
    if line.contains(COMMENT_MARKER) {
        return tokens;
    }

    let mut rest = line;
    while let Some(open) = rest.find('"') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('"') else {
            break;
        };
        let body = &after_open[..close];
        match classify(body) {
            Some(token) => {
                tokens.push(token);
                rest = &after_open[close + 1..];
            }
            None => rest = &after_open[close..],
        }
    }
    tokens
}

/// Decide whether the text between two quotes is a token.
fn classify(body: &str) -> Option<FeedToken<'_>> {
    if let Some((start, end)) = body.split_once('-') {
        return (is_address_shape(start) && is_address_shape(end))
            .then_some(FeedToken::Span { start, end });
    }

    match body.split_once('/') {
        Some((address, prefix)) => (is_address_shape(address)
            && !prefix.is_empty()
            && prefix.len() <= 3
            && prefix.bytes().all(|b| b.is_ascii_digit()))
        .then_some(FeedToken::Single {
            address,
            prefix: Some(prefix),
        }),
        None => is_address_shape(body).then_some(FeedToken::Single {
            address: body,
            prefix: None,
        }),
    }
}

/// Four dot-separated groups of 1-4 digits. Values are checked later.
fn is_address_shape(text: &str) -> bool {
    let mut groups = 0;
    for group in text.split('.') {
        if group.is_empty() || group.len() > 4 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        groups += 1;
    }
    groups == 4
}

/// Expand a span over its final octet.
pub fn expand_span(start: &str, end: &str) -> Result<Vec<AddressRange>, SpanSkip> {
    let start = parse_octets(start).map_err(SpanSkip::Malformed)?;
    let end = parse_octets(end).map_err(SpanSkip::Malformed)?;
    let [a, b, c, first] = start.octets();
    let [ea, eb, ec, last] = end.octets();

    if (a, b, c) != (ea, eb, ec) {
        return Err(SpanSkip::PrefixMismatch);
    }
    if first > last {
        return Err(SpanSkip::Inverted);
    }

    Ok((first..=last)
        .map(|d| AddressRange::host(Ipv4Addr::new(a, b, c, d)))
        .collect())
}

/// Compile raw feed text into a deduplicated allowlist.
///
/// Never fails: bad tokens are skipped and loopback is always present.
pub fn compile(text: &str) -> CompiledAllowlist {
    let mut compiled = CompiledAllowlist::loopback_only();

    for line in text.lines() {
        for token in scan_line(line) {
            match token {
                FeedToken::Single { address, prefix } => match AddressRange::parse(address, prefix) {
                    Ok(range) => {
                        compiled.ranges.insert(range);
                    }
                    Err(e) => {
                        tracing::debug!(token = %address, error = %e, "Skipping malformed address");
                        compiled.skipped += 1;
                    }
                },
                FeedToken::Span { start, end } => match expand_span(start, end) {
                    Ok(hosts) => {
                        tracing::debug!(start = %start, end = %end, hosts = hosts.len(), "Expanded address span");
                        compiled.ranges.extend(hosts);
                    }
                    Err(reason) => {
                        tracing::debug!(start = %start, end = %end, reason = ?reason, "Skipping address span");
                        compiled.skipped += 1;
                    }
                },
            }
        }
    }

    compiled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(s: &str) -> AddressRange {
        s.parse().unwrap()
    }

    #[test]
    fn test_scan_single_and_cidr() {
        let tokens = scan_line(r#"  "address_ranges"  "1.2.3.4" "10.0.0.0/8", "#);
        assert_eq!(
            tokens,
            vec![
                FeedToken::Single { address: "1.2.3.4", prefix: None },
                FeedToken::Single { address: "10.0.0.0", prefix: Some("8") },
            ]
        );
    }

    #[test]
    fn test_scan_span() {
        let tokens = scan_line(r#""ranges" { "155.133.232.98-155.133.232.99" }"#);
        assert_eq!(
            tokens,
            vec![FeedToken::Span { start: "155.133.232.98", end: "155.133.232.99" }]
        );
    }

    #[test]
    fn test_scan_ignores_comment_lines_and_noise() {
        assert!(scan_line(r#""1.2.3.4" // retired"#).is_empty());
        assert!(scan_line("1.2.3.4 unquoted").is_empty());
        assert!(scan_line(r#""1.2.3" "a.b.c.d" "1.2.3.4/""#).is_empty());
        assert!(scan_line(r#""1.2.3.4"#).is_empty());
    }

    #[test]
    fn test_expand_span_counts() {
        for (x, y) in [(0u8, 0u8), (1, 3), (10, 200), (0, 255)] {
            let hosts = expand_span(&format!("10.9.8.{x}"), &format!("10.9.8.{y}")).unwrap();
            assert_eq!(hosts.len(), usize::from(y - x) + 1);
            let distinct: HashSet<_> = hosts.iter().collect();
            assert_eq!(distinct.len(), hosts.len());
            assert_eq!(hosts.first(), Some(&host(&format!("10.9.8.{x}"))));
            assert_eq!(hosts.last(), Some(&host(&format!("10.9.8.{y}"))));
        }
    }

    #[test]
    fn test_expand_span_skips() {
        assert_eq!(expand_span("10.0.0.9", "10.0.0.3"), Err(SpanSkip::Inverted));
        assert_eq!(expand_span("10.0.0.1", "10.0.1.3"), Err(SpanSkip::PrefixMismatch));
        assert!(matches!(
            expand_span("10.0.0.1", "10.0.0.300"),
            Err(SpanSkip::Malformed(ParseError::OctetOutOfRange(300)))
        ));
    }

    #[test]
    fn test_compile_scenario() {
        let feed = "\"1.2.3.4\"\n\"10.0.0.1-10.0.0.3\"\n";
        let compiled = compile(feed);

        let expected: HashSet<_> = ["1.2.3.4/32", "10.0.0.1", "10.0.0.2", "10.0.0.3", "127.0.0.1"]
            .into_iter()
            .map(host)
            .collect();
        assert_eq!(compiled.ranges, expected);
        assert_eq!(compiled.skipped, 0);
    }

    #[test]
    fn test_compile_inverted_span_adds_nothing() {
        let compiled = compile(r#""10.0.0.5-10.0.0.1""#);
        assert_eq!(compiled.ranges, CompiledAllowlist::loopback_only().ranges);
        assert_eq!(compiled.skipped, 1);
    }

    #[test]
    fn test_compile_empty_or_garbage_is_loopback_only() {
        for feed in ["", "\n\n", "<html>404</html>", r#""999.1.1.1" "1.1.1.1/64""#] {
            let compiled = compile(feed);
            assert_eq!(compiled.ranges.len(), 1, "feed {feed:?}");
            assert!(compiled.ranges.contains(&AddressRange::LOOPBACK));
        }
    }

    #[test]
    fn test_compile_deduplicates() {
        let feed = r#"
            "5.5.5.5" "5.5.5.5"
            "5.5.5.4-5.5.5.6"
            "127.0.0.1"
        "#;
        let compiled = compile(feed);
        assert_eq!(compiled.ranges.len(), 4);
        assert_eq!(
            compiled.sorted(),
            vec![host("5.5.5.4"), host("5.5.5.5"), host("5.5.5.6"), host("127.0.0.1")]
        );
    }
}

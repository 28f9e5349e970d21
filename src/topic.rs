//! Destination tokenizing and wildcard matching.
//!
//! A destination such as `/topic/orders.eu.created` is reduced to its
//! segments after the first `/`, split on `.`:
//!
//! ```
//! use stomp_broker::topic::{matches, tokenize};
//!
//! let pattern = tokenize("/topic/orders.*.created");
//! assert!(matches(&pattern, &tokenize("/topic/orders.eu.created")));
//! assert!(!matches(&pattern, &tokenize("/topic/orders.eu.deleted")));
//! ```
//!
//! `*` matches exactly one segment; `**` matches whatever remains.

/// Matches exactly one segment.
pub const SINGLE_WILDCARD: &str = "*";

/// Matches the remainder of the destination.
pub const MULTI_WILDCARD: &str = "**";

/// Split a destination into segments.
///
/// Everything up to and including the first `/` is dropped; a destination
/// without `/` is split whole.
pub fn tokenize(destination: &str) -> Vec<String> {
    let path = match destination.find('/') {
        Some(idx) => &destination[idx + 1..],
        None => destination,
    };
    path.split('.').map(str::to_string).collect()
}

/// Check if a destination matches a subscription pattern.
///
/// Destination segments are walked in order. A pattern that runs out of
/// segments first does not match; when every destination segment is
/// consumed without a mismatch the pattern matches, even if it has extra
/// trailing segments.
pub fn matches<S: AsRef<str>, D: AsRef<str>>(pattern: &[S], destination: &[D]) -> bool {
    for (i, segment) in destination.iter().enumerate() {
        let Some(expected) = pattern.get(i) else {
            return false;
        };
        let expected = expected.as_ref();
        if expected == MULTI_WILDCARD {
            return true;
        }
        if expected != SINGLE_WILDCARD && expected != segment.as_ref() {
            return false;
        }
    }
    true
}

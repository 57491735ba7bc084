//! Ordered message markers.
//!
//! Each transport attaches a marker to every inbound message; markers are
//! monotonically increasing within a conversation stream and drive the
//! durable polling cursor. Telegram emits plain decimal `update_id`s,
//! Teams emits 19-digit fixed-width timestamp strings.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// An opaque, totally-ordered message marker.
///
/// Comparison is numeric when both values parse as unsigned integers and
/// byte-lexicographic when neither does; numeric markers sort before
/// non-numeric ones, keeping the order total even when encodings mix in
/// one collection. Lexicographic order is only correct for fixed-width,
/// left-zero-padded encodings — a property the transport adapter must
/// guarantee for its own markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marker(String);

impl Marker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, if this marker is a plain decimal integer.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for Marker {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u128>(), other.0.parse::<u128>()) {
            // String tie-break keeps cmp == Equal exactly when the
            // markers are equal ("02" vs "2").
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Marker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for Marker {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for Marker {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

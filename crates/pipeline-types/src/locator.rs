//! Stream checkpoint locator.
//!
//! A `Locator` marks a position in a document stream: `source` identifies
//! the logical stream generation and `offset` an ordinal position within
//! it. Consumers report the last durable locator; producers seek to it on
//! restart so the pipeline resumes from a consistent cut point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A checkpoint into a document stream.
///
/// Total order exists only within the same `source`; comparing locators
/// from different sources yields `None`. Equality compares both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    /// Logical stream generation identifier.
    pub source: u64,
    /// Ordinal position within the source.
    pub offset: i64,
}

impl Locator {
    /// Sentinel meaning "no checkpoint yet".
    pub const INVALID: Locator = Locator {
        source: u64::MAX,
        offset: -1,
    };

    /// Create a locator at the given source and offset.
    pub fn new(source: u64, offset: i64) -> Self {
        Self { source, offset }
    }

    /// Whether this locator is a real checkpoint.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Copy of this locator rebased onto another stream source.
    ///
    /// Used when calibrating against a producer whose source id differs
    /// from the one the checkpoint was recorded under.
    pub fn with_source(&self, source: u64) -> Self {
        Self {
            source,
            offset: self.offset,
        }
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::INVALID
    }
}

impl PartialOrd for Locator {
    /// Ordering is defined only within the same source.
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.source != other.source {
            return None;
        }
        Some(self.offset.cmp(&other.offset))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.offset)
    }
}

/// Error parsing a locator debug string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid locator string: {0}")]
pub struct LocatorParseError(pub String);

impl FromStr for Locator {
    type Err = LocatorParseError;

    /// Parse the `"source:offset"` debug form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, offset) = s
            .split_once(':')
            .ok_or_else(|| LocatorParseError(s.to_string()))?;
        let source = source
            .parse::<u64>()
            .map_err(|_| LocatorParseError(s.to_string()))?;
        let offset = offset
            .parse::<i64>()
            .map_err(|_| LocatorParseError(s.to_string()))?;
        Ok(Locator { source, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sentinel() {
        assert!(!Locator::INVALID.is_valid());
        assert!(Locator::new(0, 0).is_valid());
        assert_eq!(Locator::default(), Locator::INVALID);
    }

    #[test]
    fn test_ordering_within_source() {
        let a = Locator::new(1, 10);
        let b = Locator::new(1, 20);
        assert!(a < b);
        assert!(b > a);
        assert!(a <= Locator::new(1, 10));
    }

    #[test]
    fn test_no_ordering_across_sources() {
        let a = Locator::new(1, 10);
        let b = Locator::new(2, 10);
        assert_eq!(a.partial_cmp(&b), None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_compares_both_fields() {
        assert_eq!(Locator::new(3, 7), Locator::new(3, 7));
        assert_ne!(Locator::new(3, 7), Locator::new(3, 8));
        assert_ne!(Locator::new(3, 7), Locator::new(4, 7));
    }

    #[test]
    fn test_with_source() {
        let rebased = Locator::new(1, 42).with_source(9);
        assert_eq!(rebased, Locator::new(9, 42));
    }

    #[test]
    fn test_display_parse_roundtrip() {
        let locator = Locator::new(5, -3);
        let s = locator.to_string();
        assert_eq!(s, "5:-3");
        assert_eq!(s.parse::<Locator>().unwrap(), locator);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("nope".parse::<Locator>().is_err());
        assert!("1:".parse::<Locator>().is_err());
        assert!(":2".parse::<Locator>().is_err());
        assert!("-1:2".parse::<Locator>().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let locator = Locator::new(7, 1234);
        let json = serde_json::to_string(&locator).unwrap();
        let decoded: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(locator, decoded);
    }
}

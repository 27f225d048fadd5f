//! Core type definitions for fieldlog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sequence number of a sampled record.
///
/// Sequence numbers are strictly increasing, assigned at append time,
/// and never reused within a store's lifetime. `SeqNo(0)` is reserved
/// as "no record"; the first appended record is `SeqNo(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNo(pub u64);

impl SeqNo {
    /// The reserved "no record" value.
    pub const ZERO: Self = Self(0);

    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Capture timestamp, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns whole seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Returns this timestamp advanced by `d`.
    #[must_use]
    pub fn saturating_add(self, d: Duration) -> Self {
        Self(self.0.saturating_add(d.as_millis() as u64))
    }

    /// Returns the duration from `earlier` to `self`, or zero if
    /// `earlier` is later.
    #[must_use]
    pub fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_no_ordering() {
        assert!(SeqNo::new(1) < SeqNo::new(2));
        assert_eq!(SeqNo::new(5).next(), SeqNo::new(6));
        assert_eq!(SeqNo::ZERO.as_u64(), 0);
    }

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_millis(10_000);
        assert_eq!(t.as_secs(), 10);
        assert_eq!(t.saturating_add(Duration::from_secs(5)).as_millis(), 15_000);
        assert_eq!(
            t.saturating_since(Timestamp::from_millis(4_000)),
            Duration::from_secs(6)
        );
        assert_eq!(
            Timestamp::from_millis(1_000).saturating_since(t),
            Duration::ZERO
        );
    }

    #[test]
    fn seq_no_display() {
        assert_eq!(format!("{}", SeqNo::new(42)), "seq:42");
    }
}

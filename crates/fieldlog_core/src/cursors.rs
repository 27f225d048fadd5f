//! Logical cursors over the sequence-number space.

use crate::types::SeqNo;
use serde::Serialize;

/// The store's logical cursors.
///
/// One owned struct, held inside the store and handed out by value - never
/// ambient globals. Invariants:
///
/// - `ack < sync <= write` (with `sync = ack.next()` as the floor)
/// - `fenced <= write`; records at or above `fenced` are not yet
///   guaranteed durable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cursors {
    /// Next sequence number to assign.
    pub write: SeqNo,
    /// Next unacknowledged sequence number to hand to the sync engine.
    pub sync: SeqNo,
    /// Highest sequence number confirmed delivered.
    pub ack: SeqNo,
    /// One past the last record confirmed durable by the flash fence.
    pub fenced: SeqNo,
}

impl Cursors {
    /// Cursors for an empty store.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            write: SeqNo::new(1),
            sync: SeqNo::new(1),
            ack: SeqNo::ZERO,
            fenced: SeqNo::new(1),
        }
    }

    /// Checks the cursor invariants.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.ack < self.sync && self.sync <= self.write && self.fenced <= self.write
    }

    /// Number of records appended but not yet acknowledged.
    #[must_use]
    pub fn unacked(&self) -> u64 {
        self.write
            .as_u64()
            .saturating_sub(self.ack.as_u64())
            .saturating_sub(1)
    }
}

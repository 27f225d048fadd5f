//! Observability events.
//!
//! Every component reports what it did (and what it dropped) through an
//! [`EventSink`]. Sinks are fire-and-forget and must never block the
//! pipeline; data loss is always surfaced here, never silent.

use crate::power::WakeReason;
use crate::types::SeqNo;
use parking_lot::Mutex;
use serde::Serialize;

/// Why a scheduled sample was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// The ring was exhausted by undelivered data.
    StoreFull,
    /// Every configured sensor failed for this tick.
    AllSensorsFailed,
    /// The underlying flash operation failed.
    StoreIo,
}

/// A structured observability event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    /// A sample was appended to the store.
    SampleStored {
        /// Sequence number assigned to the record.
        seq: SeqNo,
        /// Whether an alarm rule tripped on this sample.
        alarm: bool,
    },

    /// A scheduled sample was dropped.
    SampleDropped {
        /// Why the sample was dropped.
        reason: DropReason,
    },

    /// A sensor failed to produce readings; the sample continued without it.
    SensorFailure {
        /// Name of the failing sensor.
        sensor: String,
        /// Failure description.
        detail: String,
    },

    /// The sync engine attempted delivery of a window.
    SyncAttempt {
        /// First sequence number in the window.
        from: SeqNo,
        /// Number of records in the window.
        count: usize,
    },

    /// The channel acknowledged delivery.
    SyncDelivered {
        /// Highest acknowledged sequence number.
        up_to: SeqNo,
        /// Number of records covered by this acknowledgment.
        count: usize,
    },

    /// A delivery attempt failed.
    SyncFailure {
        /// Failure description.
        detail: String,
        /// Consecutive failed attempts so far.
        attempt: u32,
    },

    /// A window was abandoned after the reject budget was exhausted.
    ///
    /// The records in `[from, to]` are documented loss.
    WindowSkipped {
        /// First skipped sequence number.
        from: SeqNo,
        /// Last skipped sequence number.
        to: SeqNo,
    },

    /// A fully-acknowledged segment was erased for reuse.
    SegmentReclaimed {
        /// Ring slot index.
        slot: u16,
        /// Erase epoch the slot held before reclamation.
        epoch: u32,
    },

    /// Corruption was found in a previously-valid region.
    CorruptionDetected {
        /// Ring slot index.
        slot: u16,
        /// Corruption description.
        detail: String,
    },

    /// Startup recovery finished.
    RecoveryCompleted {
        /// Number of valid records found on flash.
        records: u64,
        /// Whether a torn tail was discarded.
        torn_tail: bool,
    },

    /// The device committed to sleep.
    SleepEntered {
        /// Planned sleep duration in milliseconds.
        duration_ms: u64,
    },

    /// The device woke up.
    WakeUp {
        /// Reported wake cause.
        reason: WakeReason,
    },
}

/// Receives structured events from the pipeline.
///
/// Implementations must not block: the pipeline calls `emit` from its
/// cooperative loop and from store internals.
pub trait EventSink: Send + Sync {
    /// Delivers one event to the sink.
    fn emit(&self, event: &Event);
}

/// A sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}

/// Routes events to the `tracing` subscriber at a severity matching the
/// event class.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::SampleStored { seq, alarm } => {
                tracing::debug!(seq = seq.as_u64(), alarm, "sample stored");
            }
            Event::SampleDropped { reason } => {
                tracing::warn!(?reason, "sample dropped");
            }
            Event::SensorFailure { sensor, detail } => {
                tracing::warn!(sensor = %sensor, detail = %detail, "sensor failure");
            }
            Event::SyncAttempt { from, count } => {
                tracing::debug!(from = from.as_u64(), count, "sync attempt");
            }
            Event::SyncDelivered { up_to, count } => {
                tracing::info!(up_to = up_to.as_u64(), count, "sync delivered");
            }
            Event::SyncFailure { detail, attempt } => {
                tracing::warn!(detail = %detail, attempt, "sync failure");
            }
            Event::WindowSkipped { from, to } => {
                tracing::error!(from = from.as_u64(), to = to.as_u64(), "sync window skipped");
            }
            Event::SegmentReclaimed { slot, epoch } => {
                tracing::debug!(slot, epoch, "segment reclaimed");
            }
            Event::CorruptionDetected { slot, detail } => {
                tracing::error!(slot, detail = %detail, "corruption detected");
            }
            Event::RecoveryCompleted { records, torn_tail } => {
                tracing::info!(records, torn_tail, "recovery completed");
            }
            Event::SleepEntered { duration_ms } => {
                tracing::info!(duration_ms, "entering sleep");
            }
            Event::WakeUp { reason } => {
                tracing::info!(?reason, "woke up");
            }
        }
    }
}

/// A sink that records events in memory, for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Removes and returns all recorded events.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(&Event::SampleStored {
            seq: SeqNo::new(1),
            alarm: false,
        });
        sink.emit(&Event::SampleDropped {
            reason: DropReason::StoreFull,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::SampleStored { .. }));
        assert!(matches!(events[1], Event::SampleDropped { .. }));

        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn events_serialize_to_json() {
        let event = Event::WindowSkipped {
            from: SeqNo::new(5),
            to: SeqNo::new(9),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("WindowSkipped"));
        assert!(json.contains('5'));
        assert!(json.contains('9'));
    }
}

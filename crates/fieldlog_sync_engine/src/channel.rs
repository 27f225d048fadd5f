//! Channel abstraction over the uplink transport.

use fieldlog_core::{Record, SeqNo};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors a channel can report for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The remote did not answer in time.
    #[error("channel timeout")]
    Timeout,

    /// The link is down.
    #[error("channel disconnected")]
    Disconnected,

    /// The remote refused the batch.
    #[error("batch rejected: {reason}")]
    Rejected {
        /// The remote's stated reason.
        reason: String,
    },
}

impl ChannelError {
    /// True if the same batch is worth retrying as-is.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Disconnected)
    }
}

/// An explicit delivery acknowledgment.
///
/// The remote acknowledges a prefix of the batch: every record with a
/// sequence number at or below `up_to` is durably received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Highest acknowledged sequence number.
    pub up_to: SeqNo,
}

/// One logical delivery unit: a run of records in sequence order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// The records, in increasing sequence order.
    pub records: Vec<Record>,
}

impl RecordBatch {
    /// Wraps records into a batch.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First sequence number, if any.
    #[must_use]
    pub fn first_seq(&self) -> Option<SeqNo> {
        self.records.first().map(|r| r.seq)
    }

    /// Last sequence number, if any.
    #[must_use]
    pub fn last_seq(&self) -> Option<SeqNo> {
        self.records.last().map(|r| r.seq)
    }

    /// True if any record carries the alarm flag.
    #[must_use]
    pub fn has_alarm(&self) -> bool {
        self.records.iter().any(Record::alarm)
    }
}

/// The uplink to the remote collector.
///
/// The sync engine owns the channel exclusively. Implementations wrap the
/// actual transport (cellular modem, LoRaWAN stack, MQTT session) outside
/// the core.
pub trait Channel: Send {
    /// Delivers one batch, blocking the cooperative task until the remote
    /// answers or the transport gives up.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] describing whether the attempt may be
    /// retried.
    fn send(&mut self, batch: &RecordBatch) -> Result<Ack, ChannelError>;

    /// True if the transport considers itself connected.
    fn is_connected(&self) -> bool;
}

/// How the mock acknowledges a delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckBehavior {
    /// Acknowledge the whole batch.
    Full,
    /// Acknowledge only up to this sequence number.
    UpTo(SeqNo),
}

/// A scriptable channel for tests.
///
/// Responses are served from a queue; an empty queue acknowledges every
/// batch in full. Every delivered batch is recorded for inspection.
#[derive(Debug, Default)]
pub struct MockChannel {
    connected: AtomicBool,
    script: Mutex<VecDeque<Result<AckBehavior, ChannelError>>>,
    sent: Mutex<Vec<RecordBatch>>,
}

impl MockChannel {
    /// Creates a connected mock with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queues a full acknowledgment.
    pub fn enqueue_ack(&self) {
        self.script.lock().push_back(Ok(AckBehavior::Full));
    }

    /// Queues a partial acknowledgment.
    pub fn enqueue_ack_up_to(&self, seq: SeqNo) {
        self.script.lock().push_back(Ok(AckBehavior::UpTo(seq)));
    }

    /// Queues a failure.
    pub fn enqueue_failure(&self, error: ChannelError) {
        self.script.lock().push_back(Err(error));
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Batches delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<RecordBatch> {
        self.sent.lock().clone()
    }
}

impl Channel for MockChannel {
    fn send(&mut self, batch: &RecordBatch) -> Result<Ack, ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::Disconnected);
        }

        self.sent.lock().push(batch.clone());

        let behavior = self.script.lock().pop_front();
        match behavior {
            None | Some(Ok(AckBehavior::Full)) => Ok(Ack {
                up_to: batch.last_seq().unwrap_or(SeqNo::ZERO),
            }),
            Some(Ok(AckBehavior::UpTo(seq))) => Ok(Ack { up_to: seq }),
            Some(Err(err)) => Err(err),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlog_core::Timestamp;

    fn batch(seqs: &[u64]) -> RecordBatch {
        RecordBatch::new(
            seqs.iter()
                .map(|&s| Record::new(SeqNo::new(s), Timestamp::from_millis(0), 0, Vec::new()))
                .collect(),
        )
    }

    #[test]
    fn batch_bounds() {
        let b = batch(&[3, 4, 5]);
        assert_eq!(b.first_seq(), Some(SeqNo::new(3)));
        assert_eq!(b.last_seq(), Some(SeqNo::new(5)));
        assert_eq!(b.len(), 3);
        assert!(batch(&[]).is_empty());
    }

    #[test]
    fn mock_acks_in_full_by_default() {
        let mut channel = MockChannel::new();
        let ack = channel.send(&batch(&[1, 2])).unwrap();
        assert_eq!(ack.up_to, SeqNo::new(2));
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn mock_follows_script() {
        let mut channel = MockChannel::new();
        channel.enqueue_failure(ChannelError::Timeout);
        channel.enqueue_ack_up_to(SeqNo::new(1));

        assert_eq!(channel.send(&batch(&[1, 2])), Err(ChannelError::Timeout));
        assert_eq!(
            channel.send(&batch(&[1, 2])).unwrap(),
            Ack {
                up_to: SeqNo::new(1)
            }
        );
    }

    #[test]
    fn disconnected_mock_fails() {
        let mut channel = MockChannel::new();
        channel.set_connected(false);
        assert_eq!(
            channel.send(&batch(&[1])),
            Err(ChannelError::Disconnected)
        );
        // The batch was never delivered
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn transient_classification() {
        assert!(ChannelError::Timeout.is_transient());
        assert!(ChannelError::Disconnected.is_transient());
        assert!(!ChannelError::Rejected {
            reason: "bad payload".into()
        }
        .is_transient());
    }
}

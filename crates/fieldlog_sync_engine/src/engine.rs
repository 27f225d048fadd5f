//! Sync engine drain loop.

use crate::channel::{Channel, RecordBatch};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use fieldlog_core::{Event, EventSink, PowerGated, RecordStore, SeqNo, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// The engine's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing to deliver, or waiting for more records to accumulate.
    Idle,
    /// A delivery attempt is in progress.
    Sending,
    /// Waiting out a retry delay.
    Backoff,
    /// Parked by the power coordinator.
    Suspended,
}

/// Statistics about sync activity.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Delivery attempts made.
    pub attempts: u64,
    /// Batches acknowledged.
    pub batches_delivered: u64,
    /// Records acknowledged.
    pub records_delivered: u64,
    /// Transient channel failures.
    pub transient_failures: u64,
    /// Rejections from the remote.
    pub rejects: u64,
    /// Windows abandoned after the reject budget.
    pub windows_skipped: u64,
    /// Last failure description.
    pub last_error: Option<String>,
}

/// What one drain step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing pending.
    Idle,
    /// Pending records are below the accumulation threshold.
    Holdoff {
        /// Records currently pending.
        pending: usize,
    },
    /// A retry delay is still running.
    Waiting {
        /// When the next attempt is due.
        until: Timestamp,
    },
    /// The remote acknowledged records.
    Delivered {
        /// Highest acknowledged sequence number.
        up_to: SeqNo,
        /// Records covered by the acknowledgment.
        count: usize,
    },
    /// The attempt failed; the same window will be retried.
    Backoff {
        /// Consecutive failures so far.
        attempt: u32,
        /// When the next attempt is due.
        until: Timestamp,
    },
    /// A window was abandoned after the reject budget (documented loss).
    Skipped {
        /// First skipped sequence number.
        from: SeqNo,
        /// Last skipped sequence number.
        to: SeqNo,
    },
    /// The engine is suspended.
    Suspended,
}

/// Converts durable-but-undelivered records into acknowledged ones.
pub struct SyncEngine<C: Channel> {
    store: Arc<RecordStore>,
    channel: Mutex<C>,
    config: SyncConfig,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    /// Consecutive failed attempts, pacing the backoff.
    attempt: AtomicU32,
    /// Consecutive rejections, counted against the budget.
    rejects: AtomicU32,
    retry_at: Mutex<Option<Timestamp>>,
    flush_requested: AtomicBool,
    sink: Arc<dyn EventSink>,
}

impl<C: Channel> SyncEngine<C> {
    /// Creates a sync engine over the store and its exclusive channel.
    pub fn new(
        store: Arc<RecordStore>,
        channel: C,
        config: SyncConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            channel: Mutex::new(channel),
            config,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            attempt: AtomicU32::new(0),
            rejects: AtomicU32::new(0),
            retry_at: Mutex::new(None),
            flush_requested: AtomicBool::new(false),
            sink,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Requests delivery on the next step even if the accumulation
    /// threshold is not met (used for alarm samples).
    pub fn request_flush(&self) {
        self.flush_requested.store(true, Ordering::SeqCst);
    }

    /// Runs one cooperative drain step.
    ///
    /// # Errors
    ///
    /// Store failures propagate; channel failures are absorbed into
    /// backoff or a budgeted skip.
    pub fn run_once(&self, now: Timestamp) -> SyncResult<SyncOutcome> {
        if self.state() == SyncState::Suspended {
            return Ok(SyncOutcome::Suspended);
        }

        if let Some(until) = *self.retry_at.lock() {
            if now < until {
                self.set_state(SyncState::Backoff);
                return Ok(SyncOutcome::Waiting { until });
            }
        }
        *self.retry_at.lock() = None;

        let sync_cursor = self.store.cursors().sync;
        let window = self
            .store
            .read_range(sync_cursor, self.config.batch_size)?;

        if window.is_empty() {
            self.flush_requested.store(false, Ordering::SeqCst);
            self.set_state(SyncState::Idle);
            return Ok(SyncOutcome::Idle);
        }

        let batch = RecordBatch::new(window);
        let flush = self.flush_requested.load(Ordering::SeqCst);
        if batch.len() < self.config.accumulate_threshold && !flush && !batch.has_alarm() {
            self.set_state(SyncState::Idle);
            return Ok(SyncOutcome::Holdoff {
                pending: batch.len(),
            });
        }

        // These are set after the empty check above.
        let first = batch.first_seq().unwrap_or(SeqNo::ZERO);
        let last = batch.last_seq().unwrap_or(SeqNo::ZERO);

        self.set_state(SyncState::Sending);
        self.stats.write().attempts += 1;
        self.sink.emit(&Event::SyncAttempt {
            from: first,
            count: batch.len(),
        });

        let result = self.channel.lock().send(&batch);
        match result {
            Ok(ack) => {
                if ack.up_to < first {
                    // The remote acked below the window it was handed;
                    // treat it as a failed attempt and surface the bug.
                    self.schedule_retry(now, "ack below delivered window");
                    return Err(SyncError::Protocol(format!(
                        "ack {} below window start {first}",
                        ack.up_to
                    )));
                }
                let up_to = ack.up_to.min(last);
                let count = (up_to.as_u64() - first.as_u64() + 1) as usize;

                self.store.advance_ack(up_to)?;
                self.store.advance_sync(up_to.next())?;

                self.attempt.store(0, Ordering::SeqCst);
                self.rejects.store(0, Ordering::SeqCst);
                self.flush_requested.store(false, Ordering::SeqCst);

                let mut stats = self.stats.write();
                stats.batches_delivered += 1;
                stats.records_delivered += count as u64;
                stats.last_error = None;
                drop(stats);

                self.sink.emit(&Event::SyncDelivered { up_to, count });
                self.set_state(SyncState::Idle);
                Ok(SyncOutcome::Delivered { up_to, count })
            }
            Err(err) if err.is_transient() => {
                self.stats.write().transient_failures += 1;
                let (attempt, until) = self.schedule_retry(now, &err.to_string());
                Ok(SyncOutcome::Backoff { attempt, until })
            }
            Err(err) => {
                let rejects = self.rejects.fetch_add(1, Ordering::SeqCst) + 1;
                self.stats.write().rejects += 1;

                if rejects >= self.config.reject_budget {
                    // Budget exhausted: abandon the window so the ring
                    // can drain. The loss is explicit and reported.
                    self.store.advance_ack(last)?;
                    self.store.advance_sync(last.next())?;

                    self.attempt.store(0, Ordering::SeqCst);
                    self.rejects.store(0, Ordering::SeqCst);
                    *self.retry_at.lock() = None;

                    let mut stats = self.stats.write();
                    stats.windows_skipped += 1;
                    stats.last_error = Some(err.to_string());
                    drop(stats);

                    self.sink.emit(&Event::WindowSkipped {
                        from: first,
                        to: last,
                    });
                    tracing::error!(
                        from = first.as_u64(),
                        to = last.as_u64(),
                        "window skipped after reject budget"
                    );
                    self.set_state(SyncState::Idle);
                    Ok(SyncOutcome::Skipped {
                        from: first,
                        to: last,
                    })
                } else {
                    let (attempt, until) = self.schedule_retry(now, &err.to_string());
                    Ok(SyncOutcome::Backoff { attempt, until })
                }
            }
        }
    }

    /// Records a failure and schedules the next attempt.
    fn schedule_retry(&self, now: Timestamp, detail: &str) -> (u32, Timestamp) {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.config.retry.delay_for_attempt(attempt);
        let until = now.saturating_add(delay);

        *self.retry_at.lock() = Some(until);
        self.stats.write().last_error = Some(detail.to_string());
        self.sink.emit(&Event::SyncFailure {
            detail: detail.to_string(),
            attempt,
        });
        self.set_state(SyncState::Backoff);
        (attempt, until)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }
}

impl<C: Channel> PowerGated for SyncEngine<C> {
    fn suspend(&self) {
        self.set_state(SyncState::Suspended);
    }

    fn resume(&self, _now: Timestamp) {
        // Connectivity often changes across a sleep cycle; retry
        // immediately rather than waiting out a stale delay.
        *self.retry_at.lock() = None;
        self.set_state(SyncState::Idle);
    }
}

impl<C: Channel> std::fmt::Debug for SyncEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

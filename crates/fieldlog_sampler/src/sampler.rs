//! The sampling scheduler.

use crate::config::SamplerConfig;
use crate::queue::{TickEvent, TickQueue};
use crate::sensor::Sensor;
use fieldlog_core::{
    Clock, DropReason, Event, EventSink, PowerGated, RecordStore, SensorValue, SeqNo, StoreError,
    Timestamp, FLAG_ALARM,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;

/// The sampler's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Waiting for the next tick.
    Idle,
    /// Reading sensors.
    Sampling,
    /// Appending the assembled record.
    Persisting,
    /// Parked by the power coordinator.
    Suspended,
}

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// A record was appended.
    Stored {
        /// Sequence number assigned by the store.
        seq: SeqNo,
        /// True if an alarm rule tripped; the caller should ask the sync
        /// engine to flush ahead of schedule.
        urgent: bool,
    },
    /// The sample was dropped; the reason was reported to the sink.
    Dropped {
        /// Why the sample was dropped.
        reason: DropReason,
    },
}

/// Counters for sampling activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Records appended.
    pub samples_stored: u64,
    /// Samples dropped (store full, I/O failure, all sensors failed).
    pub samples_dropped: u64,
    /// Individual sensor read failures.
    pub sensor_failures: u64,
    /// Tick events dropped at the queue.
    pub ticks_dropped: u64,
}

/// Drives periodic and event-triggered acquisition.
///
/// Interior mutability throughout: the cooperative loop, interrupt
/// handlers, and the power coordinator all hold `&Sampler`.
pub struct Sampler {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
    sensors: Mutex<Vec<Box<dyn Sensor>>>,
    queue: TickQueue,
    config: SamplerConfig,
    state: RwLock<SamplerState>,
    interval: Mutex<Duration>,
    next_due: Mutex<Timestamp>,
    stats: RwLock<SamplerStats>,
    sink: Arc<dyn EventSink>,
}

impl Sampler {
    /// Creates a sampler. The first sample is due immediately.
    pub fn new(
        store: Arc<RecordStore>,
        clock: Arc<dyn Clock>,
        sensors: Vec<Box<dyn Sensor>>,
        config: SamplerConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let now = clock.now();
        let interval = config.base_interval;
        Self {
            store,
            clock,
            sensors: Mutex::new(sensors),
            queue: TickQueue::new(config.queue_depth),
            config,
            state: RwLock::new(SamplerState::Idle),
            interval: Mutex::new(interval),
            next_due: Mutex::new(now),
            stats: RwLock::new(SamplerStats::default()),
            sink,
        }
    }

    /// The tick queue, for wiring interrupt/timer callbacks.
    #[must_use]
    pub fn queue(&self) -> &TickQueue {
        &self.queue
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SamplerState {
        *self.state.read()
    }

    /// Current (possibly widened) sampling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// When the next periodic sample is due.
    #[must_use]
    pub fn next_due(&self) -> Timestamp {
        *self.next_due.lock()
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> SamplerStats {
        let mut stats = self.stats.read().clone();
        stats.ticks_dropped = self.queue.dropped();
        stats
    }

    /// Runs one cooperative step.
    ///
    /// Serves a queued trigger first, then a due periodic tick. Returns
    /// `None` when nothing is due or the sampler is suspended.
    pub fn poll(&self) -> Option<SampleOutcome> {
        if self.state() == SamplerState::Suspended {
            return None;
        }

        let now = self.clock.now();
        let due = now >= self.next_due();

        match self.queue.pop() {
            Some(TickEvent::Trigger) | Some(TickEvent::Timer) => Some(self.sample(now)),
            None if due => Some(self.sample(now)),
            None => None,
        }
    }

    /// Takes one sample: read, assemble, persist.
    fn sample(&self, now: Timestamp) -> SampleOutcome {
        *self.state.write() = SamplerState::Sampling;

        let mut values: Vec<SensorValue> = Vec::new();
        let mut failures = 0u64;
        {
            let mut sensors = self.sensors.lock();
            let sensor_count = sensors.len();
            for sensor in sensors.iter_mut() {
                match sensor.read() {
                    Ok(readings) => values.extend(readings),
                    Err(err) => {
                        failures += 1;
                        self.sink.emit(&Event::SensorFailure {
                            sensor: sensor.name().to_string(),
                            detail: err.to_string(),
                        });
                    }
                }
            }
            if failures > 0 {
                self.stats.write().sensor_failures += failures;
            }
            if values.is_empty() && sensor_count > 0 {
                return self.drop_sample(now, DropReason::AllSensorsFailed);
            }
        }

        let alarm = self
            .config
            .alarm_rules
            .iter()
            .any(|rule| rule.tripped(&values));
        let flags = if alarm { FLAG_ALARM } else { 0 };

        *self.state.write() = SamplerState::Persisting;
        let outcome = match self.store.append(now, flags, &values) {
            Ok(seq) => {
                let mut stats = self.stats.write();
                stats.samples_stored += 1;
                drop(stats);
                *self.interval.lock() = self.config.base_interval;
                self.sink.emit(&Event::SampleStored { seq, alarm });
                SampleOutcome::Stored { seq, urgent: alarm }
            }
            Err(StoreError::Full) => {
                self.widen_interval();
                return self.drop_sample(now, DropReason::StoreFull);
            }
            Err(err) => {
                tracing::warn!(error = %err, "append failed");
                return self.drop_sample(now, DropReason::StoreIo);
            }
        };

        self.finish_tick(now);
        outcome
    }

    /// Drops the current sample, reporting it, and schedules the next tick.
    fn drop_sample(&self, now: Timestamp, reason: DropReason) -> SampleOutcome {
        self.stats.write().samples_dropped += 1;
        self.sink.emit(&Event::SampleDropped { reason });
        self.finish_tick(now);
        SampleOutcome::Dropped { reason }
    }

    /// Widens the sampling interval toward its ceiling.
    fn widen_interval(&self) {
        let mut interval = self.interval.lock();
        let widened = interval.saturating_mul(self.config.widen_factor.max(1));
        *interval = widened.min(self.config.max_interval);
    }

    /// Returns to idle and schedules the next deadline from `now`.
    ///
    /// Deadlines always restart from the current time, so ticks missed
    /// while busy or asleep collapse into one.
    fn finish_tick(&self, now: Timestamp) {
        *self.next_due.lock() = now.saturating_add(*self.interval.lock());
        *self.state.write() = SamplerState::Idle;
    }
}

impl PowerGated for Sampler {
    fn suspend(&self) {
        *self.state.write() = SamplerState::Suspended;
    }

    fn resume(&self, now: Timestamp) {
        // Stale ticks from before the sleep are not replayed; the wake
        // itself samples immediately.
        self.queue.clear();
        *self.next_due.lock() = now;
        *self.state.write() = SamplerState::Idle;
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("state", &self.state())
            .field("interval", &self.interval())
            .finish_non_exhaustive()
    }
}

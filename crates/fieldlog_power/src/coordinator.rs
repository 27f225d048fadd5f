//! The device-wide lifecycle state machine.

use crate::config::PowerConfig;
use crate::error::{PowerError, PowerResult};
use fieldlog_core::{
    Event, EventSink, PowerGated, RecordStore, StoreError, Timestamp, WakeReason,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The device-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Sampling and syncing are allowed.
    Active,
    /// Draining in-flight work ahead of sleep.
    PreSleep,
    /// The device is (logically) in low-power sleep.
    Sleeping,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::PreSleep => write!(f, "pre-sleep"),
            Self::Sleeping => write!(f, "sleeping"),
        }
    }
}

/// A committed sleep: how long, and when to come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    /// Planned sleep duration.
    pub duration: Duration,
    /// Absolute wake time.
    pub wake_at: Timestamp,
}

/// Sequences sleep, wake, and shutdown around the pipeline.
///
/// The coordinator never forces its way past the store: a sleep request
/// waits (bounded) for the durability fence and unwinds on timeout.
pub struct PowerCoordinator {
    store: Arc<RecordStore>,
    tasks: Vec<Arc<dyn PowerGated>>,
    config: PowerConfig,
    state: RwLock<DeviceState>,
    sink: Arc<dyn EventSink>,
}

impl PowerCoordinator {
    /// Creates a coordinator over the store. The device starts active.
    pub fn new(store: Arc<RecordStore>, config: PowerConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            tasks: Vec::new(),
            config,
            state: RwLock::new(DeviceState::Active),
            sink,
        }
    }

    /// Registers a task to be suspended across sleep (the sampler, the
    /// sync engine).
    #[must_use]
    pub fn with_task(mut self, task: Arc<dyn PowerGated>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Current device state.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        *self.state.read()
    }

    /// Prepares and commits to sleep.
    ///
    /// Suspends the registered tasks, waits (bounded) for the store's
    /// durability fence, and plans the wake time from `interval` - the
    /// sampler's current cadence. On any failure the device unwinds to
    /// `Active` with every task resumed.
    ///
    /// # Errors
    ///
    /// - [`PowerError::InvalidTransition`] unless the device is active
    /// - [`PowerError::FenceTimeout`] if the fence is not reached in time
    /// - [`PowerError::Store`] for store failures while quiescing
    pub fn request_sleep(&self, now: Timestamp, interval: Duration) -> PowerResult<SleepPlan> {
        {
            let mut state = self.state.write();
            if *state != DeviceState::Active {
                return Err(PowerError::InvalidTransition {
                    from: state.to_string(),
                    to: DeviceState::PreSleep.to_string(),
                });
            }
            *state = DeviceState::PreSleep;
        }

        for task in &self.tasks {
            task.suspend();
        }

        if let Err(err) = self.store.quiesce(self.config.fence_timeout) {
            for task in &self.tasks {
                task.resume(now);
            }
            *self.state.write() = DeviceState::Active;
            tracing::warn!(error = %err, "sleep abandoned");
            return Err(match err {
                StoreError::FenceTimeout => PowerError::FenceTimeout,
                other => PowerError::Store(other),
            });
        }

        let plan = self.plan_sleep(now, interval);
        *self.state.write() = DeviceState::Sleeping;
        self.sink.emit(&Event::SleepEntered {
            duration_ms: plan.duration.as_millis() as u64,
        });
        Ok(plan)
    }

    /// Wakes the device and re-arms the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PowerError::InvalidTransition`] unless the device is
    /// sleeping.
    pub fn wake(&self, reason: WakeReason, now: Timestamp) -> PowerResult<()> {
        {
            let mut state = self.state.write();
            if *state != DeviceState::Sleeping {
                return Err(PowerError::InvalidTransition {
                    from: state.to_string(),
                    to: DeviceState::Active.to_string(),
                });
            }
            *state = DeviceState::Active;
        }

        for task in &self.tasks {
            task.resume(now);
        }
        self.sink.emit(&Event::WakeUp { reason });
        Ok(())
    }

    /// Computes when to wake.
    ///
    /// With alignment enabled, the wake lands on the next multiple of
    /// `interval` on the absolute clock, so a fleet of loggers reports on
    /// the same wall-clock marks; a nearly-expired cycle rolls over to
    /// the next one.
    fn plan_sleep(&self, now: Timestamp, interval: Duration) -> SleepPlan {
        let interval_ms = interval.as_millis().max(1) as u64;
        let duration = if self.config.align_to_interval {
            let mut remaining = interval_ms - (now.as_millis() % interval_ms);
            if remaining < self.config.min_sleep.as_millis() as u64 {
                remaining += interval_ms;
            }
            Duration::from_millis(remaining)
        } else {
            interval.max(self.config.min_sleep)
        };

        SleepPlan {
            duration,
            wake_at: now.saturating_add(duration),
        }
    }
}

impl fmt::Debug for PowerCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerCoordinator")
            .field("state", &self.state())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

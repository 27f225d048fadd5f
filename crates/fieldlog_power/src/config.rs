//! Power coordinator configuration.

use std::time::Duration;

/// Configuration for the power coordinator.
#[derive(Debug, Clone)]
pub struct PowerConfig {
    /// Bound on waiting for the store's durability fence before a sleep
    /// attempt is abandoned.
    pub fence_timeout: Duration,

    /// Align wake times to multiples of the sampling interval, the way a
    /// field unit reports on round wall-clock marks.
    pub align_to_interval: bool,

    /// Sleeps shorter than this roll over to the next cycle.
    pub min_sleep: Duration,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            fence_timeout: Duration::from_secs(2),
            align_to_interval: true,
            min_sleep: Duration::from_secs(5),
        }
    }
}

impl PowerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fence timeout.
    #[must_use]
    pub const fn fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    /// Sets whether wake times align to the sampling interval.
    #[must_use]
    pub const fn align_to_interval(mut self, align: bool) -> Self {
        self.align_to_interval = align;
        self
    }

    /// Sets the minimum sleep duration.
    #[must_use]
    pub const fn min_sleep(mut self, min: Duration) -> Self {
        self.min_sleep = min;
        self
    }
}

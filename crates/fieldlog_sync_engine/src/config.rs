//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum records per delivery batch.
    pub batch_size: usize,
    /// Retry configuration for failed deliveries.
    pub retry: RetryConfig,
    /// Consecutive rejections tolerated before a window is skipped.
    pub reject_budget: u32,
    /// Minimum pending records before powering the uplink.
    ///
    /// Alarm records and [`crate::SyncEngine::request_flush`] override
    /// the threshold.
    pub accumulate_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            retry: RetryConfig::default(),
            reject_budget: 3,
            accumulate_threshold: 1,
        }
    }
}

impl SyncConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the reject budget.
    #[must_use]
    pub const fn reject_budget(mut self, budget: u32) -> Self {
        self.reject_budget = budget;
        self
    }

    /// Sets the accumulation threshold.
    #[must_use]
    pub const fn accumulate_threshold(mut self, threshold: usize) -> Self {
        self.accumulate_threshold = threshold;
        self
    }
}

/// Configuration for retry backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Ceiling for the backoff delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial delay.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Disables jitter (deterministic delays, mainly for tests).
    #[must_use]
    pub const fn no_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculates the delay after `attempt` consecutive failures
    /// (1-indexed; attempt 0 means no delay).
    ///
    /// Jitter adds up to 25% to the base delay; the cap is applied last,
    /// so delays are non-decreasing and never exceed `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay = if self.jitter {
            base * (1.0 + 0.25 * rand::random::<f64>())
        } else {
            base
        };

        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

//! Sampler configuration.

use fieldlog_core::SensorValue;
use std::time::Duration;

/// A per-channel alarm threshold.
///
/// A rule trips when the channel's reading falls below `low` or rises
/// above `high`. Tripped rules set the record's alarm flag so the sync
/// engine can flush it ahead of the normal accumulation schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmRule {
    /// Channel the rule watches.
    pub channel: u8,
    /// Lower bound, if any.
    pub low: Option<f32>,
    /// Upper bound, if any.
    pub high: Option<f32>,
}

impl AlarmRule {
    /// Creates a rule watching `channel`.
    #[must_use]
    pub const fn new(channel: u8) -> Self {
        Self {
            channel,
            low: None,
            high: None,
        }
    }

    /// Sets the lower bound.
    #[must_use]
    pub const fn with_low(mut self, low: f32) -> Self {
        self.low = Some(low);
        self
    }

    /// Sets the upper bound.
    #[must_use]
    pub const fn with_high(mut self, high: f32) -> Self {
        self.high = Some(high);
        self
    }

    /// Returns true if any value on this rule's channel is out of bounds.
    #[must_use]
    pub fn tripped(&self, values: &[SensorValue]) -> bool {
        values
            .iter()
            .filter(|v| v.channel() == self.channel)
            .any(|v| {
                let reading = v.as_f32();
                self.low.is_some_and(|low| reading < low)
                    || self.high.is_some_and(|high| reading > high)
            })
    }
}

/// Configuration for the sampler.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Interval between periodic samples.
    pub base_interval: Duration,
    /// Ceiling for the widened interval under storage pressure.
    pub max_interval: Duration,
    /// Multiplier applied to the interval after a dropped sample.
    pub widen_factor: u32,
    /// Capacity of the interrupt-fed tick queue.
    pub queue_depth: usize,
    /// Alarm rules evaluated on every sample.
    pub alarm_rules: Vec<AlarmRule>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(600),
            max_interval: Duration::from_secs(3600),
            widen_factor: 2,
            queue_depth: 8,
            alarm_rules: Vec::new(),
        }
    }
}

impl SamplerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the periodic sampling interval.
    #[must_use]
    pub const fn base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    /// Sets the widened-interval ceiling.
    #[must_use]
    pub const fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Sets the widening multiplier.
    #[must_use]
    pub const fn widen_factor(mut self, factor: u32) -> Self {
        self.widen_factor = factor;
        self
    }

    /// Sets the tick queue capacity.
    #[must_use]
    pub const fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Adds an alarm rule.
    #[must_use]
    pub fn with_alarm_rule(mut self, rule: AlarmRule) -> Self {
        self.alarm_rules.push(rule);
        self
    }
}

//! # fieldlog Sampler
//!
//! Sampling scheduler for the fieldlog datalogger.
//!
//! This crate provides:
//! - The sampler state machine (idle → sampling → persisting → idle)
//! - A tick queue fed from interrupt/timer context
//! - The sensor capability-provider trait
//! - Degradation under storage pressure (drop, widen the interval)
//! - Alarm rules that flag urgent samples
//!
//! ## Architecture
//!
//! Interrupt-context callbacks never touch the store: they only enqueue
//! [`TickEvent`]s into the bounded [`TickQueue`]. The cooperative loop
//! calls [`Sampler::poll`], which drains the queue, reads the sensors,
//! and appends one record per tick.
//!
//! ## Key Invariants
//!
//! - Sampling never blocks waiting for store space
//! - Missed ticks are not replayed; the next deadline is computed from now
//! - A per-sensor failure skips that sensor, not the sample
//! - Data loss is always reported through the event sink

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod queue;
mod sampler;
mod sensor;

pub use config::{AlarmRule, SamplerConfig};
pub use error::SensorError;
pub use queue::{TickEvent, TickQueue};
pub use sampler::{SampleOutcome, Sampler, SamplerState, SamplerStats};
pub use sensor::{FixedSensor, Sensor};

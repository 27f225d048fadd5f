//! # fieldlog Power
//!
//! Power and lifecycle coordination for the fieldlog datalogger.
//!
//! This crate provides:
//! - The device-wide state machine (active → pre-sleep → sleeping)
//! - Safe sleep sequencing: tasks suspend, the store fences, and only
//!   then does the device commit to sleep
//! - Sleep planning aligned to the sampling cadence
//!
//! ## Key Invariants
//!
//! - Sleep is refused (with a bounded wait) while a store operation has
//!   not reached its durability fence - a torn write is never risked
//! - A failed sleep attempt unwinds completely: tasks resume and the
//!   device stays active
//! - Waking re-arms every registered task

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;

pub use config::PowerConfig;
pub use coordinator::{DeviceState, PowerCoordinator, SleepPlan};
pub use error::{PowerError, PowerResult};

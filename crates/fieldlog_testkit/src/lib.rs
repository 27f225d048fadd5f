//! # fieldlog Testkit
//!
//! Test utilities for the fieldlog pipeline.
//!
//! This crate provides:
//! - [`CrashableFlash`] - a flash wrapper that simulates power loss at a
//!   chosen byte count and injects sync failures
//! - [`SharedFlash`] - a cloneable region over one shared buffer, for
//!   rebuilding a store across a simulated reboot
//! - Store fixtures with record-exact ring geometry
//!
//! Crash-recovery coverage for the store lives here, next to the tools
//! that make it possible.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crash;
mod fixtures;

pub use crash::{CrashControl, CrashableFlash};
pub use fixtures::{
    config_for, fresh_store, marker_flash, open_store, ring_flash, volt, SharedFlash, REC_LEN,
};

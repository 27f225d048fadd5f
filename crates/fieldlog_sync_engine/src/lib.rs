//! # fieldlog Sync Engine
//!
//! Drains durable-but-undelivered records to the remote collector.
//!
//! This crate provides:
//! - The channel abstraction over the uplink transport
//! - A cooperative drain step ([`SyncEngine::run_once`])
//! - Retry with exponential backoff and jitter
//! - A budgeted handling of remote rejections (skip with a recorded gap)
//! - Batch accumulation before powering the uplink
//!
//! ## Architecture
//!
//! The engine reads a bounded window of records starting at the store's
//! sync cursor, delivers it as one batch, and advances the acknowledged
//! cursor on an explicit `ack up to S` from the channel. Failed deliveries
//! retry the same window - the cursor only moves on acknowledgment or an
//! explicit, reported skip.
//!
//! ## Key Invariants
//!
//! - Delivery order is non-decreasing by sequence number
//! - The sync cursor never passes an unacknowledged record (skips are
//!   explicit and reported)
//! - Backoff delays are non-decreasing and bounded by the configured cap
//! - Backoff state resets on any success

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod engine;
mod error;

pub use channel::{Ack, AckBehavior, Channel, ChannelError, MockChannel, RecordBatch};
pub use config::{RetryConfig, SyncConfig};
pub use engine::{SyncEngine, SyncOutcome, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};

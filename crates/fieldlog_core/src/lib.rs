//! # fieldlog Core
//!
//! Durable record store for the fieldlog datalogger.
//!
//! This crate provides:
//! - Record and payload wire formats with CRC32 framing
//! - A crash-safe ring of fixed-size flash segments
//! - Cursor management (`write`, `sync`, `ack`, `fenced`)
//! - A durable marker store for the acknowledged cursor
//! - Startup recovery (torn-tail detection, ring reconstruction)
//! - Observability events and the clock abstraction
//!
//! ## Architecture
//!
//! The store partitions a [`fieldlog_flash::FlashRegion`] into N segments
//! used as a ring. Records are appended to the live segment; when it fills,
//! the ring advances into the oldest fully-acknowledged segment, erasing it
//! for reuse. A segment still holding unacknowledged records is never
//! overwritten - the append fails with [`StoreError::Full`] instead.
//!
//! ## Key Invariants
//!
//! - `ack_cursor < sync_cursor <= write_cursor` at all times
//! - Sequence numbers are strictly increasing, assigned at append
//! - A record is visible to readers only after its durability fence
//! - Acknowledgment is persisted (marker fence) before any segment erase
//! - Recovery returns a durable prefix - never a torn record

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod cursors;
mod error;
mod event;
mod marker;
mod payload;
mod power;
mod record;
mod segment;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use cursors::Cursors;
pub use error::{StoreError, StoreResult};
pub use event::{DropReason, Event, EventSink, MemorySink, NullSink, TracingSink};
pub use marker::{MarkerSnapshot, MarkerStore};
pub use payload::SensorValue;
pub use power::{PowerGated, WakeReason};
pub use record::{Record, FLAG_ALARM, MAX_PAYLOAD_SIZE};
pub use segment::SEGMENT_HEADER_SIZE;
pub use store::{RecordStore, RecoveryReport};
pub use types::{SeqNo, Timestamp};

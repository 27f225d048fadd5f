//! # fieldlog Flash
//!
//! Flash region abstraction for the fieldlog datalogger core.
//!
//! This crate provides the lowest-level storage abstraction for fieldlog.
//! A flash region is an **opaque, fixed-capacity byte span** with
//! sector-granular erase - it does not interpret the data it stores.
//!
//! ## Design Principles
//!
//! - Regions are simple byte spans (read, write, erase, sync)
//! - No knowledge of fieldlog record or segment formats
//! - Erase works on whole sectors and resets them to `0xFF`
//! - `sync` is the durability fence: once it returns, prior writes
//!   survive power loss
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Regions
//!
//! - [`MemFlash`] - For testing and ephemeral operation
//! - [`FileFlash`] - Host-side persistence using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use fieldlog_flash::{FlashRegion, MemFlash};
//!
//! let mut flash = MemFlash::new(4096, 1024);
//! flash.write_at(0, b"hello").unwrap();
//! let data = flash.read_at(0, 5).unwrap();
//! assert_eq!(&data, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod mem;
mod region;

pub use error::{FlashError, FlashResult};
pub use file::FileFlash;
pub use mem::MemFlash;
pub use region::{FlashRegion, ERASED_BYTE};

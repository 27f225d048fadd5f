//! Error types for flash operations.

use std::io;
use thiserror::Error;

/// Result type for flash operations.
pub type FlashResult<T> = Result<T, FlashError>;

/// Errors that can occur during flash region operations.
#[derive(Debug, Error)]
pub enum FlashError {
    /// An I/O error occurred in the underlying medium.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to access beyond the region capacity.
    #[error("access beyond region: offset {offset}, len {len}, capacity {capacity}")]
    OutOfBounds {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        len: u64,
        /// The region capacity.
        capacity: u64,
    },

    /// Erase range was not aligned to the sector size.
    #[error("unaligned erase: offset {offset}, len {len}, sector size {sector_size}")]
    UnalignedErase {
        /// The requested erase offset.
        offset: u64,
        /// The requested erase length.
        len: u64,
        /// The region sector size.
        sector_size: u64,
    },

    /// The backing file is locked by another process.
    #[error("flash region locked: another process has exclusive access")]
    Locked,
}

//! Error types for the fieldlog core.

use thiserror::Error;

/// Result type for core operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in fieldlog core operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Flash region error.
    #[error("flash error: {0}")]
    Flash(#[from] fieldlog_flash::FlashError),

    /// The ring is exhausted by undelivered data.
    ///
    /// Every segment still holds unacknowledged records, so the append
    /// cannot reclaim space without losing data. The caller decides how
    /// to degrade.
    #[error("store full: all segments hold unacknowledged records")]
    Full,

    /// The on-flash structure is corrupted.
    ///
    /// Recoverable: the store remains usable from the last valid point.
    #[error("store corruption: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// The marker store can no longer persist cursors.
    ///
    /// Fatal: without a durable acknowledged cursor the delivery
    /// guarantees cannot be maintained.
    #[error("marker store unavailable after {failures} consecutive failures")]
    MarkerUnavailable {
        /// Number of consecutive marker I/O failures observed.
        failures: u32,
    },

    /// The durability fence could not be reached within the deadline.
    #[error("durability fence not reached within the timeout")]
    FenceTimeout,

    /// An argument was outside the accepted range.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of why the argument is invalid.
        message: String,
    },
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

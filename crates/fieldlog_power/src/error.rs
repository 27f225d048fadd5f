//! Error types for power coordination.

use thiserror::Error;

/// Result type for power operations.
pub type PowerResult<T> = Result<T, PowerError>;

/// Errors the power coordinator can report.
#[derive(Debug, Error)]
pub enum PowerError {
    /// The requested transition is not legal from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The store could not reach its durability fence in time; the
    /// device stays active.
    #[error("store did not reach its durability fence before the timeout")]
    FenceTimeout,

    /// Store failure while preparing for sleep.
    #[error("store error: {0}")]
    Store(#[from] fieldlog_core::StoreError),
}

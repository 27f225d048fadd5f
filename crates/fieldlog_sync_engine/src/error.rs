//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors the sync engine can surface to its caller.
///
/// Channel failures are absorbed by the engine itself (retry, backoff,
/// budgeted skip) and never appear here.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store error during window reads or cursor advances.
    ///
    /// [`fieldlog_core::StoreError::MarkerUnavailable`] is the one fatal
    /// case: the caller should stop the drain loop.
    #[error("store error: {0}")]
    Store(#[from] fieldlog_core::StoreError),

    /// The remote violated the acknowledgment contract.
    #[error("protocol error: {0}")]
    Protocol(String),
}

//! Error types for sensor reads.

use thiserror::Error;

/// Errors a sensor capability provider can report.
///
/// All sensor errors are per-sample and non-fatal: the sampler skips the
/// failing sensor, emits an observability event, and carries on.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The sensor did not answer on its bus.
    #[error("sensor not responding")]
    NotResponding,

    /// The sensor answered with a reading outside its valid range.
    #[error("reading out of range: {detail}")]
    OutOfRange {
        /// Description of the invalid reading.
        detail: String,
    },

    /// The underlying bus transaction failed.
    #[error("bus error: {detail}")]
    Bus {
        /// Description of the bus failure.
        detail: String,
    },
}

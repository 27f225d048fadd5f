//! Power-gating seam shared by the pipeline components.

use crate::types::Timestamp;
use serde::Serialize;

/// A component whose activity is gated by the power coordinator.
///
/// Implementors must make both calls idempotent: the coordinator may
/// suspend an already-suspended task while unwinding a failed sleep
/// attempt.
pub trait PowerGated: Send + Sync {
    /// Stops scheduling new work until [`PowerGated::resume`] is called.
    fn suspend(&self);

    /// Re-arms the component after a wake at time `now`.
    fn resume(&self, now: Timestamp);
}

/// Why the device left sleep (or reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeReason {
    /// Cold boot from power-on reset.
    PowerOn,
    /// Scheduled timer expiry.
    Timer,
    /// External trigger input (reed switch, pulse input).
    ExternalTrigger,
    /// Watchdog reset.
    Watchdog,
    /// Software-requested reset.
    SoftReset,
    /// The platform reported an unrecognized cause.
    Unknown,
}

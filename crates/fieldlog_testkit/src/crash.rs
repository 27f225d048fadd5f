//! Crash simulation for recovery testing.
//!
//! [`CrashableFlash`] wraps a flash region and cuts power after a chosen
//! number of written bytes: the write that crosses the threshold is
//! truncated mid-record, exactly like a mains drop during a program
//! operation. Reopening a store over the same buffer then exercises the
//! torn-tail recovery path.

use fieldlog_flash::{FlashError, FlashRegion, FlashResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct CrashState {
    crash_after: AtomicU64,
    written: AtomicU64,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

/// Remote control for a [`CrashableFlash`] that has been moved into a
/// store.
#[derive(Debug, Clone)]
pub struct CrashControl {
    state: Arc<CrashState>,
}

impl CrashControl {
    /// Cuts power after `bytes` more written bytes; the crossing write is
    /// truncated.
    pub fn crash_after(&self, bytes: u64) {
        let written = self.state.written.load(Ordering::SeqCst);
        self.state
            .crash_after
            .store(written + bytes, Ordering::SeqCst);
    }

    /// Makes every durability fence fail (without cutting power).
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.state.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// True once the simulated power loss happened.
    #[must_use]
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Total bytes written through the wrapper.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.state.written.load(Ordering::SeqCst)
    }

    /// Restores power for a fresh run over the same buffer.
    pub fn reset(&self) {
        self.state.crash_after.store(u64::MAX, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
        self.state.fail_on_sync.store(false, Ordering::SeqCst);
    }
}

/// A flash region that can lose power mid-write.
pub struct CrashableFlash {
    inner: Box<dyn FlashRegion>,
    state: Arc<CrashState>,
}

impl CrashableFlash {
    /// Wraps a region, returning the wrapper and its control handle.
    #[must_use]
    pub fn new(inner: Box<dyn FlashRegion>) -> (Self, CrashControl) {
        let state = Arc::new(CrashState {
            crash_after: AtomicU64::new(u64::MAX),
            written: AtomicU64::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        });
        let control = CrashControl {
            state: state.clone(),
        };
        (Self { inner, state }, control)
    }

    fn power_lost() -> FlashError {
        FlashError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "simulated power loss",
        ))
    }
}

impl FlashRegion for CrashableFlash {
    fn read_at(&self, offset: u64, len: usize) -> FlashResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(Self::power_lost());
        }

        let written = self.state.written.load(Ordering::SeqCst);
        let threshold = self.state.crash_after.load(Ordering::SeqCst);
        let allowed = threshold.saturating_sub(written);

        if (data.len() as u64) <= allowed {
            self.inner.write_at(offset, data)?;
            self.state
                .written
                .fetch_add(data.len() as u64, Ordering::SeqCst);
            return Ok(());
        }

        // Power drops partway through this write: commit the prefix,
        // leaving a torn record on flash.
        let partial = &data[..allowed as usize];
        if !partial.is_empty() {
            self.inner.write_at(offset, partial)?;
        }
        self.state.written.fetch_add(allowed, Ordering::SeqCst);
        self.state.crashed.store(true, Ordering::SeqCst);
        Err(Self::power_lost())
    }

    fn erase(&mut self, offset: u64, len: u64) -> FlashResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(Self::power_lost());
        }
        self.inner.erase(offset, len)
    }

    fn sync(&mut self) -> FlashResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(Self::power_lost());
        }
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            return Err(FlashError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated fence failure",
            )));
        }
        self.inner.sync()
    }

    fn capacity(&self) -> u64 {
        self.inner.capacity()
    }

    fn sector_size(&self) -> u64 {
        self.inner.sector_size()
    }
}

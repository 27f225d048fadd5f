//! In-memory flash region for testing.

use crate::error::{FlashError, FlashResult};
use crate::region::{FlashRegion, ERASED_BYTE};
use parking_lot::RwLock;

/// An in-memory flash region.
///
/// This region keeps all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral loggers that don't need persistence
///
/// The region starts fully erased (all bytes [`ERASED_BYTE`]), matching a
/// freshly-erased flash part.
///
/// # Thread Safety
///
/// This region is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use fieldlog_flash::{FlashRegion, MemFlash, ERASED_BYTE};
///
/// let mut flash = MemFlash::new(2048, 1024);
/// assert_eq!(flash.read_at(0, 1).unwrap(), vec![ERASED_BYTE]);
/// flash.write_at(0, b"abc").unwrap();
/// flash.erase(0, 1024).unwrap();
/// assert_eq!(flash.read_at(0, 1).unwrap(), vec![ERASED_BYTE]);
/// ```
#[derive(Debug)]
pub struct MemFlash {
    data: RwLock<Vec<u8>>,
    sector_size: u64,
}

impl MemFlash {
    /// Creates a new fully-erased in-memory region.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a multiple of `sector_size` or either
    /// is zero. Region geometry is a construction-time decision, not a
    /// runtime condition.
    #[must_use]
    pub fn new(capacity: u64, sector_size: u64) -> Self {
        assert!(sector_size > 0, "sector size must be non-zero");
        assert!(
            capacity > 0 && capacity % sector_size == 0,
            "capacity must be a non-zero multiple of the sector size"
        );
        Self {
            data: RwLock::new(vec![ERASED_BYTE; capacity as usize]),
            sector_size,
        }
    }

    /// Creates a region pre-loaded with existing content.
    ///
    /// Useful for testing recovery scenarios.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not a non-zero multiple of `sector_size`.
    #[must_use]
    pub fn with_data(data: Vec<u8>, sector_size: u64) -> Self {
        assert!(sector_size > 0, "sector size must be non-zero");
        assert!(
            !data.is_empty() && data.len() as u64 % sector_size == 0,
            "data length must be a non-zero multiple of the sector size"
        );
        Self {
            data: RwLock::new(data),
            sector_size,
        }
    }

    /// Returns a copy of the whole region content.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn check_range(&self, offset: u64, len: u64) -> FlashResult<()> {
        let capacity = self.data.read().len() as u64;
        if offset > capacity || offset.saturating_add(len) > capacity {
            return Err(FlashError::OutOfBounds {
                offset,
                len,
                capacity,
            });
        }
        Ok(())
    }
}

impl FlashRegion for MemFlash {
    fn read_at(&self, offset: u64, len: usize) -> FlashResult<Vec<u8>> {
        self.check_range(offset, len as u64)?;
        let data = self.data.read();
        let start = offset as usize;
        Ok(data[start..start + len].to_vec())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashResult<()> {
        self.check_range(offset, data.len() as u64)?;
        let mut bytes = self.data.write();
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, offset: u64, len: u64) -> FlashResult<()> {
        if offset % self.sector_size != 0 || len % self.sector_size != 0 {
            return Err(FlashError::UnalignedErase {
                offset,
                len,
                sector_size: self.sector_size,
            });
        }
        self.check_range(offset, len)?;
        let mut bytes = self.data.write();
        let start = offset as usize;
        bytes[start..start + len as usize].fill(ERASED_BYTE);
        Ok(())
    }

    fn sync(&mut self) -> FlashResult<()> {
        // In-memory region has nothing to fence
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn sector_size(&self) -> u64 {
        self.sector_size
    }
}

//! File-backed flash region for host-side persistence.

use crate::error::{FlashError, FlashResult};
use crate::region::{FlashRegion, ERASED_BYTE};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-backed flash region.
///
/// This region emulates a fixed-capacity flash part on top of OS file
/// APIs. Data survives process restarts. The backing file is created at
/// its full capacity on first open and exclusively locked so two logger
/// processes cannot share a region.
///
/// # Durability
///
/// - `sync()` calls `File::sync_data()` - the durability fence
/// - `erase()` overwrites the sectors with [`ERASED_BYTE`]
///
/// # Thread Safety
///
/// This region is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```no_run
/// use fieldlog_flash::{FileFlash, FlashRegion};
/// use std::path::Path;
///
/// let mut flash = FileFlash::open(Path::new("ring.bin"), 64 * 1024, 4096).unwrap();
/// flash.write_at(0, b"persistent").unwrap();
/// flash.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    file: RwLock<std::fs::File>,
    capacity: u64,
    sector_size: u64,
}

impl FileFlash {
    /// Opens or creates a file-backed region at the given path.
    ///
    /// A new file is created at full capacity, pre-filled with
    /// [`ERASED_BYTE`]. An existing file is reopened as-is; its length
    /// must match `capacity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is held by another
    /// process, or has a mismatched size.
    pub fn open(path: &Path, capacity: u64, sector_size: u64) -> FlashResult<Self> {
        if sector_size == 0 || capacity == 0 || capacity % sector_size != 0 {
            return Err(FlashError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid region geometry: capacity {capacity}, sector {sector_size}"),
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| FlashError::Locked)?;

        let len = file.metadata()?.len();
        if len == 0 {
            // Fresh region: format to full capacity, erased
            let sector = vec![ERASED_BYTE; sector_size as usize];
            for _ in 0..capacity / sector_size {
                file.write_all(&sector)?;
            }
            file.sync_all()?;
        } else if len != capacity {
            return Err(FlashError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("region size mismatch: file is {len} bytes, expected {capacity}"),
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            capacity,
            sector_size,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_range(&self, offset: u64, len: u64) -> FlashResult<()> {
        if offset > self.capacity || offset.saturating_add(len) > self.capacity {
            return Err(FlashError::OutOfBounds {
                offset,
                len,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl FlashRegion for FileFlash {
    fn read_at(&self, offset: u64, len: usize) -> FlashResult<Vec<u8>> {
        self.check_range(offset, len as u64)?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashResult<()> {
        self.check_range(offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
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

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let sector = vec![ERASED_BYTE; self.sector_size as usize];
        for _ in 0..len / self.sector_size {
            file.write_all(&sector)?;
        }
        Ok(())
    }

    fn sync(&mut self) -> FlashResult<()> {
        let file = self.file.write();
        file.sync_data()?;
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn sector_size(&self) -> u64 {
        self.sector_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_formats_region() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.bin");

        let flash = FileFlash::open(&path, 8192, 4096).unwrap();
        assert_eq!(flash.capacity(), 8192);
        assert_eq!(flash.sector_size(), 4096);
        assert!(flash.read_at(0, 8192).unwrap().iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn file_write_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.bin");

        let mut flash = FileFlash::open(&path, 8192, 4096).unwrap();
        flash.write_at(100, b"reading").unwrap();
        assert_eq!(flash.read_at(100, 7).unwrap(), b"reading");
    }

    #[test]
    fn file_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.bin");

        {
            let mut flash = FileFlash::open(&path, 8192, 4096).unwrap();
            flash.write_at(0, b"durable").unwrap();
            flash.sync().unwrap();
        }

        let flash = FileFlash::open(&path, 8192, 4096).unwrap();
        assert_eq!(flash.read_at(0, 7).unwrap(), b"durable");
    }

    #[test]
    fn file_erase_resets_sector() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.bin");

        let mut flash = FileFlash::open(&path, 8192, 4096).unwrap();
        flash.write_at(0, b"old data").unwrap();
        flash.erase(0, 4096).unwrap();
        assert!(flash.read_at(0, 4096).unwrap().iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn file_size_mismatch_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.bin");

        FileFlash::open(&path, 8192, 4096).unwrap();
        let result = FileFlash::open(&path, 16384, 4096);
        assert!(result.is_err());
    }

    #[test]
    fn file_out_of_bounds_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.bin");

        let mut flash = FileFlash::open(&path, 8192, 4096).unwrap();
        assert!(matches!(
            flash.write_at(8190, b"abcd"),
            Err(FlashError::OutOfBounds { .. })
        ));
        assert!(matches!(
            flash.read_at(9000, 1),
            Err(FlashError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn file_invalid_geometry_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.bin");
        assert!(FileFlash::open(&path, 1000, 4096).is_err());
    }
}

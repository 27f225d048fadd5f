//! Flash region trait definition.

use crate::error::FlashResult;

/// The value an erased flash byte reads back as.
pub const ERASED_BYTE: u8 = 0xFF;

/// A fixed-capacity flash region for fieldlog.
///
/// Flash regions are **opaque byte spans**. They provide positional reads
/// and writes, sector-granular erase, and a durability fence. fieldlog owns
/// all format interpretation - regions do not understand records, segments,
/// or markers.
///
/// # Invariants
///
/// - `read_at` returns exactly the bytes last written at that offset, or
///   [`ERASED_BYTE`] for bytes never written since the last erase
/// - `erase` resets whole sectors to [`ERASED_BYTE`]
/// - After `sync` returns, all previously written data survives power loss
/// - Regions must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemFlash`] - For testing
/// - [`super::FileFlash`] - Host-side persistence
pub trait FlashRegion: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends beyond the region capacity or
    /// an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> FlashResult<Vec<u8>>;

    /// Writes `data` starting at `offset`.
    ///
    /// The write is not durable until [`FlashRegion::sync`] returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends beyond the region capacity or
    /// an I/O error occurs.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashResult<()>;

    /// Erases the sectors covering `[offset, offset + len)`.
    ///
    /// Both `offset` and `len` must be multiples of the sector size.
    /// Erased bytes read back as [`ERASED_BYTE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the range is unaligned, extends beyond the
    /// region capacity, or an I/O error occurs.
    fn erase(&mut self, offset: u64, len: u64) -> FlashResult<()>;

    /// Durability fence.
    ///
    /// After this returns successfully, all previously written data is
    /// guaranteed to survive power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the fence operation fails.
    fn sync(&mut self) -> FlashResult<()>;

    /// Returns the total capacity of the region in bytes.
    fn capacity(&self) -> u64;

    /// Returns the erase sector size in bytes.
    fn sector_size(&self) -> u64;
}

//! Store fixtures with record-exact geometry.

use fieldlog_core::{EventSink, NullSink, RecordStore, SensorValue, StoreConfig, SEGMENT_HEADER_SIZE};
use fieldlog_flash::{FlashRegion, FlashResult, MemFlash};
use parking_lot::RwLock;
use std::sync::Arc;

/// Encoded length of a one-value ([`volt`]) record.
pub const REC_LEN: usize = 33;

/// A cloneable flash region sharing one buffer.
///
/// Every clone reads and writes the same bytes, so a test can hand one
/// clone to a store, drop the store, and reopen over another clone to
/// simulate a reboot with the flash content intact.
#[derive(Clone)]
pub struct SharedFlash {
    inner: Arc<RwLock<MemFlash>>,
}

impl SharedFlash {
    /// Creates a fully-erased shared region.
    #[must_use]
    pub fn new(capacity: u64, sector_size: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemFlash::new(capacity, sector_size))),
        }
    }

    /// Returns a copy of the whole region content.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.inner.read().data()
    }
}

impl FlashRegion for SharedFlash {
    fn read_at(&self, offset: u64, len: usize) -> FlashResult<Vec<u8>> {
        self.inner.read().read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashResult<()> {
        self.inner.write().write_at(offset, data)
    }

    fn erase(&mut self, offset: u64, len: u64) -> FlashResult<()> {
        self.inner.write().erase(offset, len)
    }

    fn sync(&mut self) -> FlashResult<()> {
        self.inner.write().sync()
    }

    fn capacity(&self) -> u64 {
        self.inner.read().capacity()
    }

    fn sector_size(&self) -> u64 {
        self.inner.read().sector_size()
    }
}

/// A one-value payload whose record encodes to exactly [`REC_LEN`] bytes.
#[must_use]
pub fn volt(millivolts: u16) -> Vec<SensorValue> {
    vec![SensorValue::Voltage {
        channel: 0,
        millivolts,
    }]
}

/// Geometry holding exactly `per_seg` one-value records per segment.
#[must_use]
pub fn config_for(segments: u16, per_seg: usize) -> StoreConfig {
    let seg_size = (SEGMENT_HEADER_SIZE + per_seg * REC_LEN).next_multiple_of(8) as u32;
    StoreConfig::new()
        .segment_count(segments)
        .segment_size(seg_size)
}

/// A shared ring region sized for `config`.
#[must_use]
pub fn ring_flash(config: &StoreConfig) -> SharedFlash {
    let capacity = u64::from(config.segment_count) * u64::from(config.segment_size);
    SharedFlash::new(capacity, 8)
}

/// A shared marker region.
#[must_use]
pub fn marker_flash() -> SharedFlash {
    SharedFlash::new(256, 8)
}

/// Opens a store over shared regions with the given sink.
///
/// # Panics
///
/// Panics if the store cannot be opened; fixtures are for tests.
#[must_use]
pub fn open_store(
    ring: SharedFlash,
    marker: SharedFlash,
    config: StoreConfig,
    sink: Arc<dyn EventSink>,
) -> RecordStore {
    RecordStore::open(Box::new(ring), Box::new(marker), config, sink).expect("store open")
}

/// Opens a store over fresh shared regions with a null sink, returning
/// the regions for later reopening.
#[must_use]
pub fn fresh_store(config: StoreConfig) -> (RecordStore, SharedFlash, SharedFlash) {
    let ring = ring_flash(&config);
    let marker = marker_flash();
    let store = open_store(ring.clone(), marker.clone(), config, Arc::new(NullSink));
    (store, ring, marker)
}

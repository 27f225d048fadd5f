//! The durable record store.
//!
//! A [`RecordStore`] partitions one flash region into a ring of fixed-size
//! segments and appends records to the live segment. The ring advances into
//! the oldest fully-acknowledged segment, erasing it for reuse; a segment
//! still holding unacknowledged records is never overwritten.
//!
//! # Locking
//!
//! Two locks, never held at the same time:
//!
//! - the flash mutex serializes all flash I/O
//! - the state mutex guards cursors and ring bookkeeping, held only for
//!   in-memory updates, never across flash I/O
//!
//! The sampler is the sole appender and the sync engine the sole
//! acknowledger; the store serializes their flash access but does not
//! support concurrent appends from multiple writers.

use crate::config::StoreConfig;
use crate::cursors::Cursors;
use crate::error::{StoreError, StoreResult};
use crate::event::{Event, EventSink};
use crate::marker::{MarkerSnapshot, MarkerStore};
use crate::payload::SensorValue;
use crate::record::{Record, CRC_SIZE, RECORD_HEADER_SIZE};
use crate::segment::{SegmentHeader, SlotState, SEGMENT_HEADER_SIZE};
use crate::types::{SeqNo, Timestamp};
use fieldlog_flash::{FlashRegion, ERASED_BYTE};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// What startup recovery found on flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of valid records found in the ring.
    pub records_recovered: u64,
    /// Whether a torn tail was discarded.
    pub torn_tail: bool,
    /// Whether a marker snapshot was found and used.
    pub resumed_from_marker: bool,
    /// Whether the live segment was sealed because it held residue
    /// beyond the last valid record.
    pub active_sealed: bool,
}

/// In-memory store state, guarded by one mutex.
struct StoreState {
    slots: Vec<SlotState>,
    active: usize,
    next_epoch: u32,
    cursors: Cursors,
    marker_failures: u32,
}

/// Where an append will land.
enum Placement {
    /// Continue in the live segment at this absolute offset.
    Live { offset: u64 },
    /// Advance the ring into `slot` first.
    Advance { slot: usize, epoch: u32, prev: usize },
}

/// The flash-backed circular record log.
pub struct RecordStore {
    flash: Mutex<Box<dyn FlashRegion>>,
    marker: MarkerStore,
    state: Mutex<StoreState>,
    config: StoreConfig,
    sink: Arc<dyn EventSink>,
    report: RecoveryReport,
}

impl RecordStore {
    /// Opens the store, running crash recovery over the ring.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid geometry or if the flash or marker
    /// region cannot be read.
    pub fn open(
        mut flash: Box<dyn FlashRegion>,
        marker_flash: Box<dyn FlashRegion>,
        config: StoreConfig,
        sink: Arc<dyn EventSink>,
    ) -> StoreResult<Self> {
        config.validate(flash.capacity(), flash.sector_size())?;

        let marker = MarkerStore::open(marker_flash)?;
        let snapshot = marker.load()?;

        let (state, report) = Self::recover(&mut *flash, &config, snapshot, sink.as_ref())?;

        sink.emit(&Event::RecoveryCompleted {
            records: report.records_recovered,
            torn_tail: report.torn_tail,
        });
        tracing::info!(
            records = report.records_recovered,
            torn_tail = report.torn_tail,
            write = state.cursors.write.as_u64(),
            ack = state.cursors.ack.as_u64(),
            "record store opened"
        );

        Ok(Self {
            flash: Mutex::new(flash),
            marker,
            state: Mutex::new(state),
            config,
            sink,
            report,
        })
    }

    /// Scans the ring and reconstructs cursors and slot bookkeeping.
    fn recover(
        flash: &mut dyn FlashRegion,
        config: &StoreConfig,
        snapshot: Option<MarkerSnapshot>,
        sink: &dyn EventSink,
    ) -> StoreResult<(StoreState, RecoveryReport)> {
        let count = config.segment_count as usize;
        let seg_size = u64::from(config.segment_size);
        let mut slots = vec![SlotState::erased(); count];

        // Pass 1: headers. A slot that is neither erased nor a valid
        // header is treated as unformatted; it will be erased before any
        // reuse.
        let mut formatted: Vec<(u32, usize)> = Vec::new();
        for (idx, slot) in slots.iter_mut().enumerate() {
            let base = idx as u64 * seg_size;
            let buf = flash.read_at(base, SEGMENT_HEADER_SIZE)?;
            match SegmentHeader::decode(&buf) {
                Ok(Some(header)) if header.slot as usize == idx => {
                    *slot = SlotState::formatted(header.epoch);
                    formatted.push((header.epoch, idx));
                }
                Ok(Some(header)) => {
                    sink.emit(&Event::CorruptionDetected {
                        slot: idx as u16,
                        detail: format!("header names slot {}, found in slot {idx}", header.slot),
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    sink.emit(&Event::CorruptionDetected {
                        slot: idx as u16,
                        detail: err.to_string(),
                    });
                }
            }
        }
        formatted.sort_unstable();

        // Pass 2: records, in epoch order. Stops at the first invalid or
        // non-consecutive record - everything after it is the discarded
        // tail of an interrupted write.
        let mut records_recovered = 0u64;
        let mut torn_tail = false;
        let mut prev_seq: Option<u64> = None;

        for &(_, idx) in &formatted {
            if torn_tail {
                break;
            }
            let base = idx as u64 * seg_size;
            let body_len = (seg_size as usize) - SEGMENT_HEADER_SIZE;
            let buf = flash.read_at(base + SEGMENT_HEADER_SIZE as u64, body_len)?;

            let mut off = 0usize;
            while off < buf.len() {
                let remaining = &buf[off..];
                if remaining.len() < RECORD_HEADER_SIZE + CRC_SIZE
                    || remaining[..4].iter().all(|&b| b == ERASED_BYTE)
                {
                    break;
                }
                match Record::decode(remaining) {
                    Ok((record, len)) => {
                        let seq = record.seq.as_u64();
                        if seq == 0 || prev_seq.is_some_and(|p| seq != p + 1) {
                            torn_tail = true;
                            break;
                        }
                        slots[idx].note_append(record.seq, len as u32);
                        prev_seq = Some(seq);
                        records_recovered += 1;
                        off += len;
                    }
                    Err(_) => {
                        torn_tail = true;
                        break;
                    }
                }
            }
        }

        // Establish the live segment, formatting a fresh ring if needed.
        let (active, next_epoch) = match formatted.last() {
            Some(&(epoch, idx)) => (idx, epoch + 1),
            None => {
                flash.erase(0, seg_size)?;
                let header = SegmentHeader { slot: 0, epoch: 1 };
                flash.write_at(0, &header.encode())?;
                flash.sync()?;
                slots[0] = SlotState::formatted(1);
                (0, 2)
            }
        };

        // Residue beyond the last valid record means the live segment
        // cannot safely take further appends without an erase. Seal it:
        // the next append advances the ring through a clean erase.
        let mut active_sealed = false;
        if !formatted.is_empty() {
            let base = active as u64 * seg_size;
            let tail_off = u64::from(slots[active].write_off);
            let tail_len = seg_size - tail_off;
            if tail_len > 0 {
                let tail = flash.read_at(base + tail_off, tail_len as usize)?;
                if tail.iter().any(|&b| b != ERASED_BYTE) {
                    slots[active].write_off = config.segment_size;
                    active_sealed = true;
                }
            }
        }

        let last_valid = prev_seq.unwrap_or(0);
        let hint = snapshot.map_or(0, |s| s.write_hint.as_u64());
        let write = SeqNo::new((last_valid + 1).max(hint).max(1));
        let ack = SeqNo::new(
            snapshot
                .map_or(0, |s| s.ack.as_u64())
                .min(write.as_u64() - 1),
        );

        let cursors = Cursors {
            write,
            sync: ack.next(),
            ack,
            fenced: write,
        };

        let state = StoreState {
            slots,
            active,
            next_epoch,
            cursors,
            marker_failures: 0,
        };

        let report = RecoveryReport {
            records_recovered,
            torn_tail,
            resumed_from_marker: snapshot.is_some(),
            active_sealed,
        };

        Ok((state, report))
    }

    /// Appends one sampled observation, assigning the next sequence number.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Full`] if the ring is exhausted by undelivered data
    /// - [`StoreError::InvalidArgument`] if the payload cannot fit a segment
    /// - [`StoreError::Flash`] if the underlying write or fence fails; the
    ///   operation is not retried internally
    pub fn append(
        &self,
        timestamp: Timestamp,
        flags: u8,
        values: &[SensorValue],
    ) -> StoreResult<SeqNo> {
        let payload_len: usize = values.iter().map(SensorValue::encoded_len).sum();
        let record_len = RECORD_HEADER_SIZE + payload_len + CRC_SIZE;
        let seg_size = self.config.segment_size as usize;
        if record_len > seg_size - SEGMENT_HEADER_SIZE {
            return Err(StoreError::invalid_argument(format!(
                "record of {record_len} bytes cannot fit a {seg_size}-byte segment"
            )));
        }

        // Plan under the state lock; commit the ring switch eagerly so a
        // concurrent ack-advance never reclaims the slot we are entering.
        let (seq, placement) = {
            let mut st = self.state.lock();
            let seq = st.cursors.write;
            let active = st.active;
            let fits = st.slots[active].write_off as usize + record_len <= seg_size;

            if fits {
                let offset =
                    active as u64 * seg_size as u64 + u64::from(st.slots[active].write_off);
                (seq, Placement::Live { offset })
            } else {
                let next = (active + 1) % st.slots.len();
                if !st.slots[next].fully_acked(st.cursors.ack) {
                    return Err(StoreError::Full);
                }
                let epoch = st.next_epoch;
                st.next_epoch += 1;
                st.slots[next] = SlotState::formatted(epoch);
                st.active = next;
                (
                    seq,
                    Placement::Advance {
                        slot: next,
                        epoch,
                        prev: active,
                    },
                )
            }
        };

        let record = Record::new(seq, timestamp, flags, values.to_vec());
        let data = record.encode()?;

        let result = self.write_record(&placement, &data);
        if let Err(err) = result {
            if let Placement::Advance { slot, prev, .. } = placement {
                // Unwind the ring switch; the slot will be re-erased on
                // the next advance attempt.
                let mut st = self.state.lock();
                st.slots[slot] = SlotState::erased();
                st.active = prev;
            }
            return Err(err);
        }

        let mut st = self.state.lock();
        let active = st.active;
        st.slots[active].note_append(seq, data.len() as u32);
        st.cursors.write = seq.next();
        if self.config.sync_on_append {
            st.cursors.fenced = st.cursors.write;
        }
        debug_assert!(st.cursors.valid());

        Ok(seq)
    }

    /// Performs the flash I/O for one append.
    fn write_record(&self, placement: &Placement, data: &[u8]) -> StoreResult<()> {
        let seg_size = u64::from(self.config.segment_size);
        let mut flash = self.flash.lock();

        let offset = match *placement {
            Placement::Live { offset } => offset,
            Placement::Advance { slot, epoch, .. } => {
                let base = slot as u64 * seg_size;
                flash.erase(base, seg_size)?;
                let header = SegmentHeader {
                    slot: slot as u16,
                    epoch,
                };
                flash.write_at(base, &header.encode())?;
                base + SEGMENT_HEADER_SIZE as u64
            }
        };

        flash.write_at(offset, data)?;
        if self.config.sync_on_append {
            flash.sync()?;
        }
        Ok(())
    }

    /// Reads records with sequence numbers at or above `from_seq`, in
    /// increasing order, up to `max_count`.
    ///
    /// The window served is the unacknowledged, fenced span: the effective
    /// start is `max(from_seq, ack_cursor + 1)` and records past the
    /// durability fence are not returned. The call is restartable with an
    /// advancing `from_seq`.
    ///
    /// # Errors
    ///
    /// Returns an error if a flash read fails. Corruption found mid-scan
    /// is surfaced as a [`Event::CorruptionDetected`] event; the damaged
    /// remainder of that segment is skipped and the scan continues with
    /// the next one.
    pub fn read_range(&self, from_seq: SeqNo, max_count: usize) -> StoreResult<Vec<Record>> {
        let seg_size = u64::from(self.config.segment_size);

        let (start, end, segments) = {
            let st = self.state.lock();
            let start = from_seq.max(st.cursors.ack.next());
            let end = st.cursors.fenced;
            let mut segments: Vec<(usize, u32, u32, SeqNo)> = st
                .slots
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| {
                    let last = slot.last_seq?;
                    (slot.formatted && last >= start)
                        .then_some((idx, slot.epoch, slot.write_off, last))
                })
                .collect();
            segments.sort_unstable_by_key(|&(_, epoch, _, _)| epoch);
            (start, end, segments)
        };

        let mut out = Vec::new();
        if start >= end || max_count == 0 {
            return Ok(out);
        }

        'segments: for (idx, _, write_off, _) in segments {
            let base = idx as u64 * seg_size;
            let body_len = write_off as usize - SEGMENT_HEADER_SIZE;
            let buf = {
                let flash = self.flash.lock();
                flash.read_at(base + SEGMENT_HEADER_SIZE as u64, body_len)?
            };

            let mut off = 0usize;
            while off < buf.len() {
                let remaining = &buf[off..];
                if remaining.len() < RECORD_HEADER_SIZE + CRC_SIZE
                    || remaining[..4].iter().all(|&b| b == ERASED_BYTE)
                {
                    break;
                }
                match Record::decode(remaining) {
                    Ok((record, len)) => {
                        off += len;
                        if record.seq >= end {
                            break 'segments;
                        }
                        if record.seq < start {
                            continue;
                        }
                        out.push(record);
                        if out.len() == max_count {
                            break 'segments;
                        }
                    }
                    Err(err) => {
                        self.sink.emit(&Event::CorruptionDetected {
                            slot: idx as u16,
                            detail: err.to_string(),
                        });
                        tracing::warn!(slot = idx, error = %err, "skipping damaged segment tail");
                        continue 'segments;
                    }
                }
            }
        }

        Ok(out)
    }

    /// Advances the acknowledged cursor to `max(ack_cursor, seq)`.
    ///
    /// Idempotent. The new cursor is persisted to the marker store (and
    /// fenced) before any segment is reclaimed, so a crash can never leave
    /// `ack_cursor` ahead of durable records. Fully-acknowledged segments
    /// other than the live one are erased for reuse.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MarkerUnavailable`] once consecutive marker
    /// failures exhaust the budget; earlier failures propagate as
    /// [`StoreError::Flash`] and leave the cursor unchanged.
    pub fn advance_ack(&self, seq: SeqNo) -> StoreResult<()> {
        let (new_ack, write_hint) = {
            let st = self.state.lock();
            let ceiling = SeqNo::new(st.cursors.fenced.as_u64().saturating_sub(1));
            let target = seq.min(ceiling);
            if target <= st.cursors.ack {
                return Ok(());
            }
            (target, st.cursors.write)
        };

        if let Err(err) = self.marker.persist(MarkerSnapshot {
            ack: new_ack,
            write_hint,
        }) {
            let mut st = self.state.lock();
            st.marker_failures += 1;
            let failures = st.marker_failures;
            drop(st);
            if failures >= self.config.marker_failure_budget {
                return Err(StoreError::MarkerUnavailable { failures });
            }
            return Err(StoreError::Flash(err));
        }

        let reclaim: Vec<(usize, u32)> = {
            let mut st = self.state.lock();
            st.marker_failures = 0;
            st.cursors.ack = st.cursors.ack.max(new_ack);
            if st.cursors.sync <= st.cursors.ack {
                st.cursors.sync = st.cursors.ack.next();
            }
            debug_assert!(st.cursors.valid());
            let active = st.active;
            let ack = st.cursors.ack;
            st.slots
                .iter()
                .enumerate()
                .filter(|&(idx, slot)| {
                    idx != active && slot.formatted && slot.last_seq.is_some() && slot.fully_acked(ack)
                })
                .map(|(idx, slot)| (idx, slot.epoch))
                .collect()
        };

        if reclaim.is_empty() {
            return Ok(());
        }

        let seg_size = u64::from(self.config.segment_size);
        {
            let mut flash = self.flash.lock();
            for &(idx, _) in &reclaim {
                flash.erase(idx as u64 * seg_size, seg_size)?;
            }
        }

        let mut st = self.state.lock();
        for &(idx, epoch) in &reclaim {
            st.slots[idx] = SlotState::erased();
            self.sink.emit(&Event::SegmentReclaimed {
                slot: idx as u16,
                epoch,
            });
        }

        Ok(())
    }

    /// Moves the sync cursor.
    ///
    /// # Errors
    ///
    /// Rejects positions below `ack_cursor + 1` or above `write_cursor`.
    pub fn advance_sync(&self, seq: SeqNo) -> StoreResult<()> {
        let mut st = self.state.lock();
        if seq < st.cursors.ack.next() || seq > st.cursors.write {
            return Err(StoreError::invalid_argument(format!(
                "sync cursor {seq} outside ({}, {}]",
                st.cursors.ack,
                st.cursors.write
            )));
        }
        st.cursors.sync = seq;
        Ok(())
    }

    /// Returns a snapshot of the cursors.
    #[must_use]
    pub fn cursors(&self) -> Cursors {
        self.state.lock().cursors
    }

    /// Number of appended, unacknowledged records.
    #[must_use]
    pub fn unacked(&self) -> u64 {
        self.state.lock().cursors.unacked()
    }

    /// Explicit durability fence: all prior appends become visible to
    /// readers and survive power loss.
    pub fn flush(&self) -> StoreResult<()> {
        self.flash.lock().sync()?;
        let mut st = self.state.lock();
        st.cursors.fenced = st.cursors.write;
        Ok(())
    }

    /// Waits (bounded) for exclusive flash access, fences everything, and
    /// snapshots the cursors to the marker store.
    ///
    /// Used by the power coordinator before sleep. An in-progress flash
    /// operation holds the flash lock, so this returns
    /// [`StoreError::FenceTimeout`] rather than interrupting it.
    pub fn quiesce(&self, timeout: Duration) -> StoreResult<()> {
        let (ack, write) = {
            let st = self.state.lock();
            (st.cursors.ack, st.cursors.write)
        };

        {
            let mut flash = match self.flash.try_lock_for(timeout) {
                Some(guard) => guard,
                None => return Err(StoreError::FenceTimeout),
            };
            flash.sync()?;
        }

        if let Err(err) = self.marker.persist(MarkerSnapshot {
            ack,
            write_hint: write,
        }) {
            let mut st = self.state.lock();
            st.marker_failures += 1;
            let failures = st.marker_failures;
            drop(st);
            if failures >= self.config.marker_failure_budget {
                return Err(StoreError::MarkerUnavailable { failures });
            }
            return Err(StoreError::Flash(err));
        }

        let mut st = self.state.lock();
        st.marker_failures = 0;
        st.cursors.fenced = st.cursors.fenced.max(write);
        Ok(())
    }

    /// What recovery found when the store was opened.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.report
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("config", &self.config)
            .field("cursors", &self.cursors())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MemorySink;
    use fieldlog_flash::MemFlash;
    use parking_lot::RwLock;

    /// A cloneable flash region sharing one buffer, so tests can rebuild
    /// a store over the same content to simulate reboot.
    #[derive(Clone)]
    struct SharedFlash {
        inner: Arc<RwLock<MemFlash>>,
    }

    impl SharedFlash {
        fn new(capacity: u64, sector_size: u64) -> Self {
            Self {
                inner: Arc::new(RwLock::new(MemFlash::new(capacity, sector_size))),
            }
        }
    }

    impl FlashRegion for SharedFlash {
        fn read_at(&self, offset: u64, len: usize) -> fieldlog_flash::FlashResult<Vec<u8>> {
            self.inner.read().read_at(offset, len)
        }
        fn write_at(&mut self, offset: u64, data: &[u8]) -> fieldlog_flash::FlashResult<()> {
            self.inner.write().write_at(offset, data)
        }
        fn erase(&mut self, offset: u64, len: u64) -> fieldlog_flash::FlashResult<()> {
            self.inner.write().erase(offset, len)
        }
        fn sync(&mut self) -> fieldlog_flash::FlashResult<()> {
            self.inner.write().sync()
        }
        fn capacity(&self) -> u64 {
            self.inner.read().capacity()
        }
        fn sector_size(&self) -> u64 {
            self.inner.read().sector_size()
        }
    }

    /// One-value payload: record length 25 + 4 + 4 = 33 bytes.
    fn volt(mv: u16) -> Vec<SensorValue> {
        vec![SensorValue::Voltage {
            channel: 0,
            millivolts: mv,
        }]
    }

    const REC_LEN: usize = 33;

    /// Geometry holding exactly `per_seg` one-value records per segment.
    fn config_for(segments: u16, per_seg: usize) -> (StoreConfig, u64) {
        let seg_size = (SEGMENT_HEADER_SIZE + per_seg * REC_LEN).next_multiple_of(8) as u32;
        let config = StoreConfig::new()
            .segment_count(segments)
            .segment_size(seg_size);
        let capacity = u64::from(seg_size) * u64::from(segments);
        (config, capacity)
    }

    fn open_store(
        flash: SharedFlash,
        marker: SharedFlash,
        config: StoreConfig,
    ) -> (RecordStore, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let store = RecordStore::open(
            Box::new(flash),
            Box::new(marker),
            config,
            sink.clone(),
        )
        .unwrap();
        (store, sink)
    }

    fn fresh_store(segments: u16, per_seg: usize) -> (RecordStore, SharedFlash, SharedFlash) {
        let (config, capacity) = config_for(segments, per_seg);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);
        let (store, _) = open_store(flash.clone(), marker.clone(), config);
        (store, flash, marker)
    }

    fn append_n(store: &RecordStore, n: u64) -> Vec<SeqNo> {
        (0..n)
            .map(|i| {
                store
                    .append(Timestamp::from_millis(1_000 + i), 0, &volt(3_300))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn sequence_numbers_strictly_increasing() {
        let (store, _, _) = fresh_store(4, 5);
        let seqs = append_n(&store, 12);
        for (i, seq) in seqs.iter().enumerate() {
            assert_eq!(seq.as_u64(), i as u64 + 1);
        }
        assert_eq!(store.cursors().write, SeqNo::new(13));
    }

    #[test]
    fn append_read_roundtrip() {
        let (store, _, _) = fresh_store(4, 5);
        let values = vec![
            SensorValue::Temperature {
                channel: 0,
                celsius: 19.5,
            },
            SensorValue::Humidity {
                channel: 1,
                percent: 40.0,
            },
        ];
        let seq = store
            .append(Timestamp::from_millis(42), 0, &values)
            .unwrap();

        let records = store.read_range(seq, 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].seq, seq);
        assert_eq!(records[0].timestamp, Timestamp::from_millis(42));
        assert_eq!(records[0].values, values);
    }

    #[test]
    fn read_range_is_restartable() {
        let (store, _, _) = fresh_store(4, 5);
        append_n(&store, 10);

        let first = store.read_range(SeqNo::new(1), 4).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first.last().unwrap().seq, SeqNo::new(4));

        let rest = store.read_range(first.last().unwrap().seq.next(), 100).unwrap();
        assert_eq!(rest.len(), 6);
        assert_eq!(rest[0].seq, SeqNo::new(5));
        assert_eq!(rest.last().unwrap().seq, SeqNo::new(10));
    }

    #[test]
    fn ring_fills_to_store_full() {
        // Capacity for exactly 100 records
        let (store, _, _) = fresh_store(5, 20);
        let mut stored = 0u64;
        let mut first_failure = None;

        for i in 0..150u64 {
            match store.append(Timestamp::from_millis(i), 0, &volt(3_300)) {
                Ok(_) => stored += 1,
                Err(StoreError::Full) => {
                    if first_failure.is_none() {
                        first_failure = Some(i + 1);
                    }
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(stored, 100);
        assert_eq!(first_failure, Some(101));
    }

    #[test]
    fn acked_segments_are_reclaimed_for_reuse() {
        let (store, _, _) = fresh_store(2, 3);

        // Fill both segments
        append_n(&store, 6);
        assert!(matches!(
            store.append(Timestamp::from_millis(0), 0, &volt(1)),
            Err(StoreError::Full)
        ));

        // Acknowledge the first segment; the ring can advance again
        store.advance_ack(SeqNo::new(3)).unwrap();
        let seq = store.append(Timestamp::from_millis(0), 0, &volt(1)).unwrap();
        assert_eq!(seq, SeqNo::new(7));
    }

    #[test]
    fn reclamation_emits_event_after_full_ack() {
        let (config, capacity) = config_for(3, 2);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);
        let (store, sink) = open_store(flash, marker, config);

        append_n(&store, 5); // segments: [1,2], [3,4], [5..]
        store.advance_ack(SeqNo::new(4)).unwrap();

        let reclaimed: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::SegmentReclaimed { .. }))
            .collect();
        assert_eq!(reclaimed.len(), 2);
    }

    #[test]
    fn advance_ack_is_idempotent() {
        let (store, _, _) = fresh_store(4, 5);
        append_n(&store, 6);

        store.advance_ack(SeqNo::new(4)).unwrap();
        assert_eq!(store.cursors().ack, SeqNo::new(4));

        store.advance_ack(SeqNo::new(4)).unwrap();
        assert_eq!(store.cursors().ack, SeqNo::new(4));

        store.advance_ack(SeqNo::new(2)).unwrap();
        assert_eq!(store.cursors().ack, SeqNo::new(4));
    }

    #[test]
    fn advance_ack_never_passes_the_fence() {
        let (config, capacity) = config_for(4, 5);
        let config = config.sync_on_append(false);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);
        let (store, _) = open_store(flash, marker, config);

        append_n(&store, 3);
        // Nothing fenced yet: the ack cursor cannot move
        store.advance_ack(SeqNo::new(3)).unwrap();
        assert_eq!(store.cursors().ack, SeqNo::ZERO);

        store.flush().unwrap();
        store.advance_ack(SeqNo::new(3)).unwrap();
        assert_eq!(store.cursors().ack, SeqNo::new(3));
    }

    #[test]
    fn unfenced_records_invisible_to_readers() {
        let (config, capacity) = config_for(4, 5);
        let config = config.sync_on_append(false);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);
        let (store, _) = open_store(flash, marker, config);

        append_n(&store, 2);
        assert!(store.read_range(SeqNo::new(1), 10).unwrap().is_empty());

        store.flush().unwrap();
        assert_eq!(store.read_range(SeqNo::new(1), 10).unwrap().len(), 2);
    }

    #[test]
    fn recovery_restores_cursors_and_records() {
        let (config, capacity) = config_for(4, 5);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);

        {
            let (store, _) = open_store(flash.clone(), marker.clone(), config.clone());
            append_n(&store, 3);
            store.advance_ack(SeqNo::new(2)).unwrap();
        }

        // Reboot over the same flash content
        let (store, _) = open_store(flash, marker, config);
        let report = store.recovery_report().clone();
        assert_eq!(report.records_recovered, 3);
        assert!(!report.torn_tail);
        assert!(report.resumed_from_marker);

        let cursors = store.cursors();
        assert_eq!(cursors.ack, SeqNo::new(2));
        assert_eq!(cursors.sync, SeqNo::new(3));
        assert_eq!(cursors.write, SeqNo::new(4));

        // Only the unacknowledged window is served
        let records = store.read_range(SeqNo::new(1), 10).unwrap();
        let seqs: Vec<u64> = records.iter().map(|r| r.seq.as_u64()).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn recovery_discards_torn_tail() {
        let (config, capacity) = config_for(4, 5);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);

        {
            let (store, _) = open_store(flash.clone(), marker.clone(), config.clone());
            append_n(&store, 4);
        }

        // Corrupt the last record's CRC region, as a torn write would
        let tail_off = (SEGMENT_HEADER_SIZE + 3 * REC_LEN + REC_LEN - 2) as u64;
        {
            let mut f = flash.clone();
            f.write_at(tail_off, &[0x00]).unwrap();
        }

        let (store, _) = open_store(flash, marker, config);
        let report = store.recovery_report().clone();
        assert_eq!(report.records_recovered, 3);
        assert!(report.torn_tail);
        assert!(report.active_sealed);

        // The torn record is gone; the prefix survives
        let records = store.read_range(SeqNo::new(1), 10).unwrap();
        assert_eq!(records.len(), 3);
        // Sequence numbers are not reused past the marker hint
        assert!(store.cursors().write >= SeqNo::new(4));
    }

    #[test]
    fn recovery_write_hint_prevents_seq_reuse() {
        let (config, capacity) = config_for(4, 5);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);

        {
            let (store, _) = open_store(flash.clone(), marker.clone(), config.clone());
            append_n(&store, 5);
            store.advance_ack(SeqNo::new(1)).unwrap(); // persists write_hint = 6
        }

        // Wipe the ring but keep the marker: everything unfenced is "lost"
        {
            let mut f = flash.clone();
            f.erase(0, capacity).unwrap();
        }

        let (store, _) = open_store(flash, marker, config);
        // No records survive, but sequence numbers resume past the hint
        assert_eq!(store.recovery_report().records_recovered, 0);
        assert!(store.cursors().write >= SeqNo::new(6));
    }

    #[test]
    fn sealed_segment_is_skipped_for_appends() {
        let (config, capacity) = config_for(3, 5);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);

        {
            let (store, _) = open_store(flash.clone(), marker.clone(), config.clone());
            append_n(&store, 2);
        }

        // Residue after the valid records forces a seal on recovery
        let residue_off = (SEGMENT_HEADER_SIZE + 2 * REC_LEN + 5) as u64;
        {
            let mut f = flash.clone();
            f.write_at(residue_off, &[0xAB, 0xCD]).unwrap();
        }

        let (store, _) = open_store(flash, marker, config);
        assert!(store.recovery_report().active_sealed);

        // Appends continue in a fresh segment, and old records remain
        let seq = store.append(Timestamp::from_millis(0), 0, &volt(1)).unwrap();
        assert_eq!(seq, SeqNo::new(3));
        assert_eq!(store.read_range(SeqNo::new(1), 10).unwrap().len(), 3);
    }

    #[test]
    fn advance_sync_validates_bounds() {
        let (store, _, _) = fresh_store(4, 5);
        append_n(&store, 3);
        store.advance_ack(SeqNo::new(1)).unwrap();

        assert!(store.advance_sync(SeqNo::new(1)).is_err()); // below ack + 1
        assert!(store.advance_sync(SeqNo::new(5)).is_err()); // beyond write
        store.advance_sync(SeqNo::new(3)).unwrap();
        assert_eq!(store.cursors().sync, SeqNo::new(3));
    }

    #[test]
    fn oversized_record_rejected() {
        let (store, _, _) = fresh_store(2, 3);
        let huge: Vec<SensorValue> = (0..100)
            .map(|i| SensorValue::PulseCount {
                channel: i as u8,
                count: 0,
            })
            .collect();
        assert!(matches!(
            store.append(Timestamp::from_millis(0), 0, &huge),
            Err(StoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn quiesce_fences_and_snapshots() {
        let (config, capacity) = config_for(4, 5);
        let config = config.sync_on_append(false);
        let flash = SharedFlash::new(capacity, 8);
        let marker = SharedFlash::new(256, 8);

        {
            let (store, _) = open_store(flash.clone(), marker.clone(), config.clone());
            append_n(&store, 4);
            store.quiesce(Duration::from_millis(100)).unwrap();
            assert_eq!(store.cursors().fenced, SeqNo::new(5));
        }

        // The quiesce marker snapshot carries the write hint across reboot
        let (store, _) = open_store(flash, marker, config);
        assert_eq!(store.cursors().write, SeqNo::new(5));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// Appending then reading back any batch returns the same
            /// payloads in order, gap-free.
            #[test]
            fn roundtrip_preserves_order(millivolts in proptest::collection::vec(0u16..u16::MAX, 1..40)) {
                let (store, _, _) = fresh_store(8, 8);
                for &mv in &millivolts {
                    store.append(Timestamp::from_millis(0), 0, &volt(mv)).unwrap();
                }

                let records = store.read_range(SeqNo::new(1), millivolts.len()).unwrap();
                prop_assert_eq!(records.len(), millivolts.len());
                for (i, record) in records.iter().enumerate() {
                    prop_assert_eq!(record.seq.as_u64(), i as u64 + 1);
                    prop_assert_eq!(record.values[0], SensorValue::Voltage { channel: 0, millivolts: millivolts[i] });
                }
            }

            /// After any prefix of acks, recovery yields exactly the
            /// unacknowledged suffix.
            #[test]
            fn recovery_yields_unacked_suffix(total in 1u64..24, acked_fraction in 0.0f64..1.0) {
                let (config, capacity) = config_for(8, 4);
                let flash = SharedFlash::new(capacity, 8);
                let marker = SharedFlash::new(256, 8);

                let acked = (total as f64 * acked_fraction) as u64;
                {
                    let (store, _) = open_store(flash.clone(), marker.clone(), config.clone());
                    append_n(&store, total);
                    if acked > 0 {
                        store.advance_ack(SeqNo::new(acked)).unwrap();
                    }
                }

                let (store, _) = open_store(flash, marker, config);
                let records = store.read_range(SeqNo::new(1), total as usize + 1).unwrap();
                let expected: Vec<u64> = (acked + 1..=total).collect();
                let got: Vec<u64> = records.iter().map(|r| r.seq.as_u64()).collect();
                prop_assert_eq!(got, expected);
            }
        }
    }
}

//! Record wire format and serialization.

use crate::error::{StoreError, StoreResult};
use crate::payload::{decode_values, encode_values, SensorValue};
use crate::types::{SeqNo, Timestamp};
use serde::Serialize;

/// Magic bytes identifying a record.
pub const RECORD_MAGIC: [u8; 4] = *b"FREC";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

/// Flag bit: an alarm rule tripped on this sample.
pub const FLAG_ALARM: u8 = 0x01;

/// Header size for records.
/// magic (4) + version (2) + flags (1) + seq (8) + timestamp (8) + length (2) = 25 bytes
pub(crate) const RECORD_HEADER_SIZE: usize = 25;

/// CRC size.
pub(crate) const CRC_SIZE: usize = 4;

/// Maximum payload size for a record.
///
/// The record format uses a 2-byte length field; payloads beyond this are
/// rejected at append time.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// One sampled observation, immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Sequence number assigned at append time.
    pub seq: SeqNo,
    /// Capture timestamp.
    pub timestamp: Timestamp,
    /// Flag bits ([`FLAG_ALARM`]).
    pub flags: u8,
    /// Typed sensor values.
    pub values: Vec<SensorValue>,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(seq: SeqNo, timestamp: Timestamp, flags: u8, values: Vec<SensorValue>) -> Self {
        Self {
            seq,
            timestamp,
            flags,
            values,
        }
    }

    /// Returns true if an alarm rule tripped on this sample.
    #[must_use]
    pub fn alarm(&self) -> bool {
        self.flags & FLAG_ALARM != 0
    }

    /// Returns the full encoded length of this record in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE
            + self
                .values
                .iter()
                .map(SensorValue::encoded_len)
                .sum::<usize>()
            + CRC_SIZE
    }

    /// Serializes the record with its envelope and CRC.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let payload = encode_values(&self.values);
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(StoreError::invalid_argument(format!(
                "record payload too large: {} bytes exceeds maximum of {} bytes",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let mut data = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len() + CRC_SIZE);

        // Magic
        data.extend_from_slice(&RECORD_MAGIC);

        // Version
        data.extend_from_slice(&RECORD_VERSION.to_le_bytes());

        // Flags
        data.push(self.flags);

        // Sequence number and timestamp
        data.extend_from_slice(&self.seq.as_u64().to_le_bytes());
        data.extend_from_slice(&self.timestamp.as_millis().to_le_bytes());

        // Payload length
        let len = payload.len() as u16;
        data.extend_from_slice(&len.to_le_bytes());

        // Payload
        data.extend_from_slice(&payload);

        // CRC32 (over everything before it)
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        Ok(data)
    }

    /// Deserializes one record from the start of `buf`.
    ///
    /// Returns the record and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a corruption error on a bad magic, unsupported version,
    /// truncated envelope, or CRC mismatch.
    pub fn decode(buf: &[u8]) -> StoreResult<(Self, usize)> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Err(StoreError::corrupt("truncated record header"));
        }

        if buf[0..4] != RECORD_MAGIC {
            return Err(StoreError::corrupt("invalid record magic"));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > RECORD_VERSION {
            return Err(StoreError::corrupt(format!(
                "unsupported record version {version}"
            )));
        }

        let flags = buf[6];
        let seq = u64::from_le_bytes(buf[7..15].try_into().unwrap_or([0; 8]));
        let timestamp = u64::from_le_bytes(buf[15..23].try_into().unwrap_or([0; 8]));
        let payload_len = u16::from_le_bytes([buf[23], buf[24]]) as usize;

        let total_len = RECORD_HEADER_SIZE + payload_len + CRC_SIZE;
        if buf.len() < total_len {
            return Err(StoreError::corrupt("truncated record body"));
        }

        let crc_start = RECORD_HEADER_SIZE + payload_len;
        let stored_crc = u32::from_le_bytes(
            buf[crc_start..crc_start + CRC_SIZE]
                .try_into()
                .unwrap_or([0; 4]),
        );
        let computed_crc = compute_crc32(&buf[..crc_start]);
        if stored_crc != computed_crc {
            return Err(StoreError::corrupt(format!(
                "record checksum mismatch: expected {stored_crc:08x}, got {computed_crc:08x}"
            )));
        }

        let values = decode_values(&buf[RECORD_HEADER_SIZE..crc_start])?;

        Ok((
            Self {
                seq: SeqNo::new(seq),
                timestamp: Timestamp::from_millis(timestamp),
                flags,
                values,
            },
            total_len,
        ))
    }
}

/// Computes CRC32 checksum for data.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    // CRC32, IEEE polynomial
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

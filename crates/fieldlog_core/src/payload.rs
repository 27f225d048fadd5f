//! Typed sensor values and their wire encoding.
//!
//! A record payload is a list of [`SensorValue`]s, each bound to a numbered
//! channel. The wire form is `channel (1) | type (1) | value (n)` with
//! little-endian fixed-width values, sized for constrained uplinks:
//! temperatures travel as deci-degrees in an `i16`, humidity as
//! half-percent steps in a `u8`, and so on. Out-of-range inputs saturate
//! to the representable range rather than failing the sample.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Wire type tag for a digital input state.
const TYPE_DIGITAL: u8 = 0x00;
/// Wire type tag for an analog input, centi-units.
const TYPE_ANALOG: u8 = 0x02;
/// Wire type tag for a pulse counter.
const TYPE_PULSE_COUNT: u8 = 0x05;
/// Wire type tag for a temperature, deci-degrees Celsius.
const TYPE_TEMPERATURE: u8 = 0x67;
/// Wire type tag for relative humidity, half-percent steps.
const TYPE_HUMIDITY: u8 = 0x68;
/// Wire type tag for a voltage, millivolts.
const TYPE_VOLTAGE: u8 = 0x74;

/// One typed reading on a numbered channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorValue {
    /// Digital input state.
    DigitalInput {
        /// Channel number.
        channel: u8,
        /// Input state (0 or 1 for plain inputs; small counts allowed).
        value: u8,
    },

    /// Analog input reading.
    AnalogInput {
        /// Channel number.
        channel: u8,
        /// Reading in engineering units; encoded as centi-units.
        value: f32,
    },

    /// Accumulated pulse count.
    PulseCount {
        /// Channel number.
        channel: u8,
        /// Pulses accumulated since the last reset.
        count: u32,
    },

    /// Temperature reading.
    Temperature {
        /// Channel number.
        channel: u8,
        /// Degrees Celsius; encoded as deci-degrees.
        celsius: f32,
    },

    /// Relative humidity reading.
    Humidity {
        /// Channel number.
        channel: u8,
        /// Percent relative humidity; encoded in half-percent steps.
        percent: f32,
    },

    /// Supply or battery voltage.
    Voltage {
        /// Channel number.
        channel: u8,
        /// Millivolts.
        millivolts: u16,
    },
}

impl SensorValue {
    /// Returns the channel this value is bound to.
    #[must_use]
    pub fn channel(&self) -> u8 {
        match *self {
            Self::DigitalInput { channel, .. }
            | Self::AnalogInput { channel, .. }
            | Self::PulseCount { channel, .. }
            | Self::Temperature { channel, .. }
            | Self::Humidity { channel, .. }
            | Self::Voltage { channel, .. } => channel,
        }
    }

    /// Returns the wire type tag.
    #[must_use]
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::DigitalInput { .. } => TYPE_DIGITAL,
            Self::AnalogInput { .. } => TYPE_ANALOG,
            Self::PulseCount { .. } => TYPE_PULSE_COUNT,
            Self::Temperature { .. } => TYPE_TEMPERATURE,
            Self::Humidity { .. } => TYPE_HUMIDITY,
            Self::Voltage { .. } => TYPE_VOLTAGE,
        }
    }

    /// Returns the reading as a float, for threshold evaluation.
    #[must_use]
    pub fn as_f32(&self) -> f32 {
        match *self {
            Self::DigitalInput { value, .. } => f32::from(value),
            Self::AnalogInput { value, .. } => value,
            Self::PulseCount { count, .. } => count as f32,
            Self::Temperature { celsius, .. } => celsius,
            Self::Humidity { percent, .. } => percent,
            Self::Voltage { millivolts, .. } => f32::from(millivolts),
        }
    }

    /// Returns the encoded length in bytes, including channel and type.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        2 + match self {
            Self::DigitalInput { .. } | Self::Humidity { .. } => 1,
            Self::AnalogInput { .. } | Self::Temperature { .. } | Self::Voltage { .. } => 2,
            Self::PulseCount { .. } => 4,
        }
    }

    /// Appends the wire form of this value to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.channel());
        buf.push(self.type_tag());
        match *self {
            Self::DigitalInput { value, .. } => buf.push(value),
            Self::AnalogInput { value, .. } => {
                let centi = saturate_i16(value * 100.0);
                buf.extend_from_slice(&centi.to_le_bytes());
            }
            Self::PulseCount { count, .. } => buf.extend_from_slice(&count.to_le_bytes()),
            Self::Temperature { celsius, .. } => {
                let deci = saturate_i16(celsius * 10.0);
                buf.extend_from_slice(&deci.to_le_bytes());
            }
            Self::Humidity { percent, .. } => {
                let half = (percent * 2.0).clamp(0.0, 255.0) as u8;
                buf.push(half);
            }
            Self::Voltage { millivolts, .. } => {
                buf.extend_from_slice(&millivolts.to_le_bytes());
            }
        }
    }

    /// Decodes one value from `buf` at `*cursor`, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Returns a corruption error on an unknown type tag or a truncated
    /// value.
    pub fn decode(buf: &[u8], cursor: &mut usize) -> StoreResult<Self> {
        let channel = take(buf, cursor, 1)?[0];
        let tag = take(buf, cursor, 1)?[0];

        let value = match tag {
            TYPE_DIGITAL => Self::DigitalInput {
                channel,
                value: take(buf, cursor, 1)?[0],
            },
            TYPE_ANALOG => {
                let raw = i16::from_le_bytes(take(buf, cursor, 2)?.try_into().unwrap_or([0; 2]));
                Self::AnalogInput {
                    channel,
                    value: f32::from(raw) / 100.0,
                }
            }
            TYPE_PULSE_COUNT => {
                let raw = u32::from_le_bytes(take(buf, cursor, 4)?.try_into().unwrap_or([0; 4]));
                Self::PulseCount {
                    channel,
                    count: raw,
                }
            }
            TYPE_TEMPERATURE => {
                let raw = i16::from_le_bytes(take(buf, cursor, 2)?.try_into().unwrap_or([0; 2]));
                Self::Temperature {
                    channel,
                    celsius: f32::from(raw) / 10.0,
                }
            }
            TYPE_HUMIDITY => {
                let raw = take(buf, cursor, 1)?[0];
                Self::Humidity {
                    channel,
                    percent: f32::from(raw) / 2.0,
                }
            }
            TYPE_VOLTAGE => {
                let raw = u16::from_le_bytes(take(buf, cursor, 2)?.try_into().unwrap_or([0; 2]));
                Self::Voltage {
                    channel,
                    millivolts: raw,
                }
            }
            other => {
                return Err(StoreError::corrupt(format!(
                    "unknown sensor value type 0x{other:02x}"
                )))
            }
        };

        Ok(value)
    }
}

/// Encodes a payload of values into its wire form.
pub(crate) fn encode_values(values: &[SensorValue]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.iter().map(SensorValue::encoded_len).sum());
    for value in values {
        value.encode_into(&mut buf);
    }
    buf
}

/// Decodes a payload of values from its wire form.
pub(crate) fn decode_values(buf: &[u8]) -> StoreResult<Vec<SensorValue>> {
    let mut cursor = 0;
    let mut values = Vec::new();
    while cursor < buf.len() {
        values.push(SensorValue::decode(buf, &mut cursor)?);
    }
    Ok(values)
}

fn take<'a>(buf: &'a [u8], cursor: &mut usize, n: usize) -> StoreResult<&'a [u8]> {
    if *cursor + n > buf.len() {
        return Err(StoreError::corrupt("unexpected end of payload"));
    }
    let bytes = &buf[*cursor..*cursor + n];
    *cursor += n;
    Ok(bytes)
}

fn saturate_i16(value: f32) -> i16 {
    value.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

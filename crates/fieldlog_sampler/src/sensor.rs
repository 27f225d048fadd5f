//! Sensor capability-provider interface.

use crate::error::SensorError;
use fieldlog_core::SensorValue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A sensor capability provider.
///
/// Drivers live outside the core; the sampler only needs typed readings.
/// One sensor may report several values (a combined temperature/humidity
/// part reports both on its channels).
pub trait Sensor: Send {
    /// A short name used in observability events.
    fn name(&self) -> &str;

    /// Takes one reading.
    ///
    /// # Errors
    ///
    /// Returns a [`SensorError`] if the reading could not be taken. The
    /// sampler treats this as per-sample and non-fatal.
    fn read(&mut self) -> Result<Vec<SensorValue>, SensorError>;
}

/// A sensor returning configured values, for tests and bring-up.
#[derive(Debug)]
pub struct FixedSensor {
    name: String,
    values: Mutex<Vec<SensorValue>>,
    fail: AtomicBool,
}

impl FixedSensor {
    /// Creates a sensor that reports `values` on every read.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<SensorValue>) -> Self {
        Self {
            name: name.into(),
            values: Mutex::new(values),
            fail: AtomicBool::new(false),
        }
    }

    /// Replaces the reported values.
    pub fn set_values(&self, values: Vec<SensorValue>) {
        *self.values.lock() = values;
    }

    /// Makes subsequent reads fail (or succeed again).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Sensor for FixedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<Vec<SensorValue>, SensorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SensorError::NotResponding);
        }
        Ok(self.values.lock().clone())
    }
}

//! Generic `Hardware` trait for any robot body the brainstem can drive.
//!
//! Backends implement this trait and are handed to the control loop once at
//! startup.  The rest of the core only ever talks to the trait, so a
//! simulator can be swapped for a physical chassis without touching safety or
//! decision logic.

use std::fmt;
use std::time::Duration;

use brainstem_types::{ActuationCommand, BrainstemError, SensorSnapshot};
use chrono::{DateTime, Utc};

/// Diagnostic record returned by [`Hardware::status`].
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareStatus {
    /// Human-readable backend name, e.g. `"PiCar-X Simulator"`.
    pub model: String,
    pub initialized: bool,
    /// Latched by [`Hardware::emergency_stop`] until the next accepted
    /// actuation.
    pub emergency_stop_active: bool,
    /// Age of the most recent sensor reading, `None` before the first read.
    pub last_reading_age: Option<Duration>,
}

impl HardwareStatus {
    /// Build a status record, deriving the reading age from its timestamp.
    pub fn new(
        model: impl Into<String>,
        initialized: bool,
        emergency_stop_active: bool,
        last_reading: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            model: model.into(),
            initialized,
            emergency_stop_active,
            last_reading_age: last_reading
                .and_then(|ts| (Utc::now() - ts).to_std().ok()),
        }
    }
}

impl fmt::Display for HardwareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (initialized={}, estop={}",
            self.model, self.initialized, self.emergency_stop_active
        )?;
        match self.last_reading_age {
            Some(age) => write!(f, ", last_reading={}ms)", age.as_millis()),
            None => write!(f, ", last_reading=never)"),
        }
    }
}

/// A robot body: something that can be sensed and actuated.
///
/// All calls are made from the single control-loop task, one at a time.
pub trait Hardware: Send {
    /// Bring the backend up.  Must be called before any other operation.
    ///
    /// # Errors
    ///
    /// Returns [`BrainstemError::HardwareFault`] when the body cannot be
    /// brought up.
    fn initialize(&mut self) -> Result<(), BrainstemError>;

    /// Capture one snapshot of every sensor.
    ///
    /// # Errors
    ///
    /// Returns [`BrainstemError::HardwareFault`] when the backend is not
    /// initialised or a sensor cannot be read.
    fn read_sensors(&mut self) -> Result<SensorSnapshot, BrainstemError>;

    /// Drive the outputs to `command`.
    ///
    /// # Errors
    ///
    /// Returns [`BrainstemError::HardwareFault`] when the command cannot be
    /// applied.
    fn apply(&mut self, command: &ActuationCommand) -> Result<(), BrainstemError>;

    /// Halt every motor immediately, pre-empting any in-flight actuation.
    ///
    /// # Errors
    ///
    /// Returns [`BrainstemError::HardwareFault`] when the stop could not be
    /// confirmed.
    fn emergency_stop(&mut self) -> Result<(), BrainstemError>;

    /// Stop the body and release its resources.
    fn shutdown(&mut self);

    /// Snapshot of the backend's own health.
    fn status(&self) -> HardwareStatus;
}

impl<T: Hardware + ?Sized> Hardware for Box<T> {
    fn initialize(&mut self) -> Result<(), BrainstemError> {
        (**self).initialize()
    }

    fn read_sensors(&mut self) -> Result<SensorSnapshot, BrainstemError> {
        (**self).read_sensors()
    }

    fn apply(&mut self, command: &ActuationCommand) -> Result<(), BrainstemError> {
        (**self).apply(command)
    }

    fn emergency_stop(&mut self) -> Result<(), BrainstemError> {
        (**self).emergency_stop()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }

    fn status(&self) -> HardwareStatus {
        (**self).status()
    }
}

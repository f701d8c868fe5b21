//! [`ReplayHardware`] – plays back recorded sensor snapshots.
//!
//! Each [`read_sensors`][Hardware::read_sensors] call returns the next
//! snapshot in the script (re-stamped with the current time); once the script
//! is exhausted the last snapshot repeats forever.  Every command and
//! emergency stop the backend receives is recorded so dry runs and tests can
//! assert on exactly what the control core decided.

use std::fs;
use std::path::Path;

use brainstem_types::{ActuationCommand, BrainstemError, SensorSnapshot};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::hardware::{Hardware, HardwareStatus};

const MODEL: &str = "Replay";

/// One entry in the actuation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    Command(ActuationCommand),
    EmergencyStop,
}

/// Hardware backend driven by a fixed snapshot script.
#[derive(Default)]
pub struct ReplayHardware {
    script: Vec<SensorSnapshot>,
    cursor: usize,
    log: Vec<Actuation>,
    initialized: bool,
    emergency_stop_active: bool,
    fail_apply: bool,
    last_reading: Option<DateTime<Utc>>,
}

impl ReplayHardware {
    /// Replay `script` in order.  An empty script makes every read fail.
    pub fn new(script: Vec<SensorSnapshot>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Load a script from a JSON array of snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`BrainstemError::HardwareFault`] when the file cannot be read
    /// or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, BrainstemError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            BrainstemError::hardware(MODEL, format!("failed to read {}: {e}", path.display()))
        })?;
        let script: Vec<SensorSnapshot> = serde_json::from_str(&raw).map_err(|e| {
            BrainstemError::hardware(MODEL, format!("failed to parse {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), frames = script.len(), "loaded replay script");
        Ok(Self::new(script))
    }

    /// Make every subsequent [`apply`][Hardware::apply] fail.
    pub fn failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    /// Everything the backend has been told to do, oldest first.
    pub fn log(&self) -> &[Actuation] {
        &self.log
    }

    /// Only the regular commands, oldest first.
    pub fn applied(&self) -> Vec<ActuationCommand> {
        self.log
            .iter()
            .filter_map(|a| match a {
                Actuation::Command(cmd) => Some(*cmd),
                Actuation::EmergencyStop => None,
            })
            .collect()
    }

    /// Number of emergency stops received.
    pub fn emergency_stops(&self) -> usize {
        self.log
            .iter()
            .filter(|a| matches!(a, Actuation::EmergencyStop))
            .count()
    }

    /// Number of snapshots served so far.
    pub fn reads(&self) -> usize {
        self.cursor
    }
}

impl Hardware for ReplayHardware {
    fn initialize(&mut self) -> Result<(), BrainstemError> {
        self.initialized = true;
        Ok(())
    }

    fn read_sensors(&mut self) -> Result<SensorSnapshot, BrainstemError> {
        let index = self.cursor.min(self.script.len().saturating_sub(1));
        let mut snapshot = self
            .script
            .get(index)
            .cloned()
            .ok_or_else(|| BrainstemError::hardware(MODEL, "replay script is empty"))?;
        snapshot.timestamp = Utc::now();
        self.cursor += 1;
        self.last_reading = Some(snapshot.timestamp);
        Ok(snapshot)
    }

    fn apply(&mut self, command: &ActuationCommand) -> Result<(), BrainstemError> {
        if self.fail_apply {
            return Err(BrainstemError::hardware(MODEL, "actuation rejected"));
        }
        debug!(?command, "replay backend received command");
        self.emergency_stop_active = false;
        self.log.push(Actuation::Command(*command));
        Ok(())
    }

    fn emergency_stop(&mut self) -> Result<(), BrainstemError> {
        self.emergency_stop_active = true;
        self.log.push(Actuation::EmergencyStop);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialized = false;
    }

    fn status(&self) -> HardwareStatus {
        HardwareStatus::new(
            MODEL,
            self.initialized,
            self.emergency_stop_active,
            self.last_reading,
        )
    }
}

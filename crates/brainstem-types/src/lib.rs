//! `brainstem-types` – shared vocabulary of the brainstem control core.
//!
//! Every crate in the workspace speaks in terms of the values defined here:
//! the per-cycle [`SensorSnapshot`], the [`ActuationCommand`] handed to the
//! hardware, the [`DangerReason`] reported by the safety gate, and the
//! [`BrainstemError`] taxonomy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Actuation bounds
// ─────────────────────────────────────────────────────────────────────────────

/// Lowest accepted drive PWM pulse width (µs).
pub const MOTOR_PWM_MIN: u16 = 1000;
/// Highest accepted drive PWM pulse width (µs).
pub const MOTOR_PWM_MAX: u16 = 2000;
/// Drive PWM that holds the wheels still.
pub const MOTOR_NEUTRAL: u16 = 1500;
/// Lowest accepted camera servo pulse width (µs).
pub const SERVO_PWM_MIN: u16 = 500;
/// Highest accepted camera servo pulse width (µs).
pub const SERVO_PWM_MAX: u16 = 2500;
/// Servo PWM that centres the camera.
pub const SERVO_NEUTRAL: u16 = 1500;

// ─────────────────────────────────────────────────────────────────────────────
// Sensor side
// ─────────────────────────────────────────────────────────────────────────────

/// Where the robot is currently drawing power from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerSource {
    Battery,
    External,
}

/// A raw image frame captured alongside a sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw RGB24 pixel data, shared between snapshots of the same frame.
    pub data: Arc<[u8]>,
}

/// Everything the robot knows about the world at the start of one cycle.
///
/// Captured once per cycle by the hardware backend and consumed read-only by
/// every component for the rest of that cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Battery terminal voltage (V).
    pub battery_voltage: f32,
    /// Forward ultrasonic range to the nearest obstacle (cm).
    pub ultrasonic_distance: f32,
    pub power_source: PowerSource,
    /// Motor current draw (A), left then right.
    pub motor_current: (f32, f32),
    #[serde(default)]
    pub camera_frame: Option<CameraFrame>,
    /// Left, centre, right line-follower readings.
    #[serde(default)]
    pub line_sensors: Option<(f32, f32, f32)>,
}

impl SensorSnapshot {
    /// A snapshot taken now with nothing but the two safety-relevant readings
    /// filled in: battery powered, motors idle, no camera or line sensors.
    pub fn basic(battery_voltage: f32, ultrasonic_distance: f32) -> Self {
        Self {
            timestamp: Utc::now(),
            battery_voltage,
            ultrasonic_distance,
            power_source: PowerSource::Battery,
            motor_current: (0.0, 0.0),
            camera_frame: None,
            line_sensors: None,
        }
    }

    /// Seconds since the Unix epoch, as carried on the wire.
    pub fn unix_seconds(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actuation side
// ─────────────────────────────────────────────────────────────────────────────

/// One cycle's worth of output to the drive motors, camera servo and buzzer.
///
/// Every field is held inside its PWM bounds; use [`ActuationCommand::new`]
/// to build one from untrusted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationCommand {
    pub motor_left: u16,
    pub motor_right: u16,
    pub servo_camera: u16,
    pub buzzer_active: bool,
}

impl Default for ActuationCommand {
    fn default() -> Self {
        Self {
            motor_left: MOTOR_NEUTRAL,
            motor_right: MOTOR_NEUTRAL,
            servo_camera: SERVO_NEUTRAL,
            buzzer_active: false,
        }
    }
}

impl ActuationCommand {
    /// Build a command, clamping every level into its PWM range.
    pub fn new(motor_left: i64, motor_right: i64, servo_camera: i64, buzzer_active: bool) -> Self {
        Self {
            motor_left: clamp_level(motor_left, MOTOR_PWM_MIN, MOTOR_PWM_MAX),
            motor_right: clamp_level(motor_right, MOTOR_PWM_MIN, MOTOR_PWM_MAX),
            servo_camera: clamp_level(servo_camera, SERVO_PWM_MIN, SERVO_PWM_MAX),
            buzzer_active,
        }
    }

    /// Drive both wheels at the given levels with the camera centred.
    pub fn drive(motor_left: u16, motor_right: u16) -> Self {
        Self::new(
            i64::from(motor_left),
            i64::from(motor_right),
            i64::from(SERVO_NEUTRAL),
            false,
        )
    }

    /// All outputs neutral, buzzer off.
    pub fn full_stop() -> Self {
        Self::default()
    }

    /// `true` when both wheels are at neutral.
    pub fn is_stationary(&self) -> bool {
        self.motor_left == MOTOR_NEUTRAL && self.motor_right == MOTOR_NEUTRAL
    }
}

fn clamp_level(value: i64, min: u16, max: u16) -> u16 {
    value.clamp(i64::from(min), i64::from(max)) as u16
}

// ─────────────────────────────────────────────────────────────────────────────
// Safety
// ─────────────────────────────────────────────────────────────────────────────

/// Why the safety gate forced a full stop this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DangerReason {
    CriticalBattery { voltage: f32 },
    ImminentCollision { distance_cm: f32 },
}

impl std::fmt::Display for DangerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DangerReason::CriticalBattery { voltage } => {
                write!(f, "critical battery ({voltage:.2} V)")
            }
            DangerReason::ImminentCollision { distance_cm } => {
                write!(f, "collision imminent ({distance_cm:.1} cm)")
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error taxonomy spanning hardware faults, decision-link failures and
/// configuration problems.
///
/// None of these ever terminate the control loop; they degrade it to a full
/// stop or to local autonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrainstemError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Link Timeout: {0}")]
    LinkTimeout(String),

    #[error("Link Closed: {0}")]
    LinkClosed(String),

    #[error("Transport Fault: {0}")]
    Transport(String),

    #[error("Protocol Anomaly: {0}")]
    ProtocolAnomaly(String),

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),
}

impl BrainstemError {
    /// Shorthand for a [`BrainstemError::HardwareFault`].
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        BrainstemError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// `true` for the errors after which the decision session cannot be used
    /// again without reconnecting.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, BrainstemError::LinkClosed(_) | BrainstemError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_is_neutral() {
        let cmd = ActuationCommand::default();
        assert_eq!(cmd.motor_left, MOTOR_NEUTRAL);
        assert_eq!(cmd.motor_right, MOTOR_NEUTRAL);
        assert_eq!(cmd.servo_camera, SERVO_NEUTRAL);
        assert!(!cmd.buzzer_active);
        assert_eq!(cmd, ActuationCommand::full_stop());
        assert!(cmd.is_stationary());
    }

    #[test]
    fn new_clamps_out_of_range_levels() {
        let cmd = ActuationCommand::new(-40, 9000, 100, true);
        assert_eq!(cmd.motor_left, MOTOR_PWM_MIN);
        assert_eq!(cmd.motor_right, MOTOR_PWM_MAX);
        assert_eq!(cmd.servo_camera, SERVO_PWM_MIN);
        assert!(cmd.buzzer_active);
    }

    #[test]
    fn drive_keeps_camera_centred() {
        let cmd = ActuationCommand::drive(1400, 1600);
        assert_eq!(cmd.motor_left, 1400);
        assert_eq!(cmd.motor_right, 1600);
        assert_eq!(cmd.servo_camera, SERVO_NEUTRAL);
        assert!(!cmd.is_stationary());
    }

    #[test]
    fn power_source_serializes_screaming_case() {
        let json = serde_json::to_string(&PowerSource::External).unwrap();
        assert_eq!(json, "\"EXTERNAL\"");
    }

    #[test]
    fn snapshot_json_roundtrip_without_optional_fields() {
        let snap = SensorSnapshot::basic(11.8, 120.0);
        let json = serde_json::to_string(&snap).unwrap();
        let back: SensorSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
        assert!(back.camera_frame.is_none());
    }

    #[test]
    fn unix_seconds_tracks_timestamp() {
        let snap = SensorSnapshot::basic(12.0, 50.0);
        let expected = snap.timestamp.timestamp() as f64;
        assert!((snap.unix_seconds() - expected).abs() < 1.0);
    }

    #[test]
    fn danger_reason_display() {
        let r = DangerReason::CriticalBattery { voltage: 10.0 };
        assert!(r.to_string().contains("critical battery"));
        let r = DangerReason::ImminentCollision { distance_cm: 5.0 };
        assert!(r.to_string().contains("5.0 cm"));
    }

    #[test]
    fn brainstem_error_display_and_fatality() {
        let err = BrainstemError::hardware("left_motor", "overcurrent");
        assert!(err.to_string().contains("left_motor"));
        assert!(!err.is_session_fatal());
        assert!(BrainstemError::LinkClosed("peer hung up".into()).is_session_fatal());
        assert!(!BrainstemError::LinkTimeout("500ms".into()).is_session_fatal());
    }
}

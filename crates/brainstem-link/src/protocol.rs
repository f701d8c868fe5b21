//! Wire format spoken with the decision service.
//!
//! Every frame is one MessagePack map tagged by a `type` field:
//!
//! | Direction | `type` | Body |
//! |---|---|---|
//! | robot → service | `SENSOR_DATA` | `timestamp`, `robot_id`, `data: {timestamp, battery_voltage, ultrasonic_distance, power_source, motor_current, has_camera_frame}` |
//! | service → robot | `MOTOR_COMMANDS` | `data: {motor_left, motor_right, servo_camera, buzzer_active}`, every field optional |
//! | service → robot | `ERROR` | `error` |
//!
//! Camera pixels never leave the robot; only a `has_camera_frame` flag is
//! sent.  Any reply `type` other than the two above decodes as
//! [`Reply::Unknown`].

use brainstem_types::{
    ActuationCommand, BrainstemError, MOTOR_NEUTRAL, PowerSource, SERVO_NEUTRAL, SensorSnapshot,
};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Sensor summary carried inside a `SENSOR_DATA` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub timestamp: f64,
    pub battery_voltage: f32,
    pub ultrasonic_distance: f32,
    pub power_source: PowerSource,
    pub motor_current: (f32, f32),
    pub has_camera_frame: bool,
}

impl From<&SensorSnapshot> for SensorSummary {
    fn from(snapshot: &SensorSnapshot) -> Self {
        Self {
            timestamp: snapshot.unix_seconds(),
            battery_voltage: snapshot.battery_voltage,
            ultrasonic_distance: snapshot.ultrasonic_distance,
            power_source: snapshot.power_source,
            motor_current: snapshot.motor_current,
            has_camera_frame: snapshot.camera_frame.is_some(),
        }
    }
}

/// Messages the robot sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    SensorData {
        timestamp: f64,
        robot_id: String,
        data: SensorSummary,
    },
}

impl Request {
    /// Build the `SENSOR_DATA` request for one snapshot.
    pub fn sensor_data(snapshot: &SensorSnapshot, robot_id: &str) -> Self {
        Request::SensorData {
            timestamp: snapshot.unix_seconds(),
            robot_id: robot_id.to_string(),
            data: SensorSummary::from(snapshot),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply
// ─────────────────────────────────────────────────────────────────────────────

/// Body of a `MOTOR_COMMANDS` reply.  Absent fields mean "neutral".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCommands {
    #[serde(default, alias = "motor_left_pwm", skip_serializing_if = "Option::is_none")]
    pub motor_left: Option<i64>,
    #[serde(default, alias = "motor_right_pwm", skip_serializing_if = "Option::is_none")]
    pub motor_right: Option<i64>,
    #[serde(default, alias = "servo_camera_pwm", skip_serializing_if = "Option::is_none")]
    pub servo_camera: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buzzer_active: Option<bool>,
}

impl MotorCommands {
    /// Fill absent fields with neutral defaults and clamp the rest into range.
    pub fn into_command(self) -> ActuationCommand {
        ActuationCommand::new(
            self.motor_left.unwrap_or(i64::from(MOTOR_NEUTRAL)),
            self.motor_right.unwrap_or(i64::from(MOTOR_NEUTRAL)),
            self.servo_camera.unwrap_or(i64::from(SERVO_NEUTRAL)),
            self.buzzer_active.unwrap_or(false),
        )
    }
}

/// Messages the decision service sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    MotorCommands {
        #[serde(default)]
        data: MotorCommands,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, BrainstemError> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| BrainstemError::ProtocolAnomaly(format!("encode failed: {e}")))
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, BrainstemError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| BrainstemError::ProtocolAnomaly(format!("decode failed: {e}")))
}

/// Serialise the `SENSOR_DATA` request for `snapshot`.
pub fn encode_request(snapshot: &SensorSnapshot, robot_id: &str) -> Result<Vec<u8>, BrainstemError> {
    encode(&Request::sensor_data(snapshot, robot_id))
}

/// Parse a request frame (the decision-service side of the exchange).
pub fn decode_request(bytes: &[u8]) -> Result<Request, BrainstemError> {
    decode(bytes)
}

/// Serialise a reply frame (the decision-service side of the exchange).
pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>, BrainstemError> {
    encode(reply)
}

/// Parse a reply frame.
///
/// # Errors
///
/// Returns [`BrainstemError::ProtocolAnomaly`] for anything that is not a
/// MessagePack map with a string `type`, or whose body does not fit the kind.
pub fn decode_reply(bytes: &[u8]) -> Result<Reply, BrainstemError> {
    decode(bytes)
}

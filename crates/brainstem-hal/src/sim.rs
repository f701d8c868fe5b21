//! In-process PiCar-X simulation for development and CI without a physical
//! robot.
//!
//! [`SimulatedPicar`] integrates a simple differential-drive model from the
//! commanded PWM levels, drains a battery over time, and ranges the nearest
//! fixed obstacle inside the ultrasonic sensor's forward cone.
//!
//! # Example
//!
//! ```rust
//! use brainstem_hal::{Hardware, SimulatedPicar};
//! use brainstem_types::ActuationCommand;
//!
//! let mut picar = SimulatedPicar::new();
//! picar.initialize().expect("simulator always initialises");
//! picar.apply(&ActuationCommand::drive(1600, 1600)).unwrap();
//! let snapshot = picar.read_sensors().unwrap();
//! assert!(snapshot.battery_voltage > 11.0);
//! ```

use std::f32::consts::{PI, TAU};
use std::sync::Arc;
use std::time::{Duration, Instant};

use brainstem_types::{
    ActuationCommand, BrainstemError, CameraFrame, MOTOR_NEUTRAL, PowerSource, SERVO_NEUTRAL,
    SensorSnapshot,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::hardware::{Hardware, HardwareStatus};

// ────────────────────────────────────────────────────────────────────────────
// Model constants
// ────────────────────────────────────────────────────────────────────────────

const MODEL: &str = "PiCar-X Simulator";
const FULL_VOLTAGE: f32 = 12.0;
const FLOOR_VOLTAGE: f32 = 10.0;
const DRAIN_VOLTS_PER_HOUR: f32 = 0.5;
const WHEELBASE_M: f32 = 0.15;
const MAX_RANGE_CM: f32 = 400.0;
const MIN_RANGE_CM: f32 = 5.0;
const RANGE_NOISE_CM: f32 = 2.0;
/// Half-width of the ultrasonic sensor's forward cone.
const SENSOR_HALF_CONE_RAD: f32 = PI / 6.0;
const DEFAULT_OBSTACLES: [(f32, f32); 3] = [(2.0, 0.0), (-1.5, 1.0), (0.5, -2.0)];

// ────────────────────────────────────────────────────────────────────────────
// SimulatedPicar
// ────────────────────────────────────────────────────────────────────────────

/// Simulated PiCar-X chassis.
pub struct SimulatedPicar {
    /// Position in metres.
    position: (f32, f32),
    /// Heading in radians, kept in `[0, 2π)`.
    orientation: f32,
    wheel_speed_left: f32,
    wheel_speed_right: f32,
    camera_angle: f32,
    power_connected: bool,
    obstacles: Vec<(f32, f32)>,
    /// Integration step applied on every accepted command.
    step: f32,
    frame_size: (u32, u32),
    /// Last rendered frame, keyed by its fill colour.
    frame_cache: Option<([u8; 3], Arc<[u8]>)>,
    started: Instant,
    /// Simulated runtime added on top of the wall clock.
    fast_forward: Duration,
    rng: StdRng,
    initialized: bool,
    emergency_stop_active: bool,
    last_reading: Option<DateTime<Utc>>,
}

impl Default for SimulatedPicar {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPicar {
    /// A simulator at the origin facing +x, with the default obstacle field,
    /// a 0.1 s integration step and a 640×480 camera.
    pub fn new() -> Self {
        Self {
            position: (0.0, 0.0),
            orientation: 0.0,
            wheel_speed_left: 0.0,
            wheel_speed_right: 0.0,
            camera_angle: 0.0,
            power_connected: false,
            obstacles: DEFAULT_OBSTACLES.to_vec(),
            step: 0.1,
            frame_size: (640, 480),
            frame_cache: None,
            started: Instant::now(),
            fast_forward: Duration::ZERO,
            rng: StdRng::seed_from_u64(0x5EED),
            initialized: false,
            emergency_stop_active: false,
            last_reading: None,
        }
    }

    /// Replace the obstacle field (metres, world frame).
    pub fn with_obstacles(mut self, obstacles: Vec<(f32, f32)>) -> Self {
        self.obstacles = obstacles;
        self
    }

    /// Set the integration step used for every accepted command.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step.as_secs_f32();
        self
    }

    /// Set the synthetic camera resolution.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self.frame_cache = None;
        self
    }

    /// Seed the range-noise generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Pretend the simulator has been running for an extra `by`.
    pub fn fast_forward(&mut self, by: Duration) {
        self.fast_forward += by;
    }

    /// Plug the robot into external power.
    pub fn connect_power(&mut self) {
        self.power_connected = true;
        info!("simulated external power connected");
    }

    /// Unplug external power.
    pub fn disconnect_power(&mut self) {
        self.power_connected = false;
        info!("simulated external power disconnected");
    }

    /// Current position (m) and heading (rad).
    pub fn pose(&self) -> (f32, f32, f32) {
        (self.position.0, self.position.1, self.orientation)
    }

    /// Current camera pan angle (rad).
    pub fn camera_angle(&self) -> f32 {
        self.camera_angle
    }

    fn battery_voltage(&self) -> f32 {
        let hours = (self.started.elapsed() + self.fast_forward).as_secs_f32() / 3600.0;
        (FULL_VOLTAGE - hours * DRAIN_VOLTS_PER_HOUR).max(FLOOR_VOLTAGE)
    }

    fn ultrasonic_distance(&mut self) -> f32 {
        let (x, y) = self.position;
        let nearest = self
            .obstacles
            .iter()
            .filter_map(|&(ox, oy)| {
                let (dx, dy) = (ox - x, oy - y);
                let bearing = wrap_angle(dy.atan2(dx) - self.orientation);
                (bearing.abs() < SENSOR_HALF_CONE_RAD).then(|| dx.hypot(dy) * 100.0)
            })
            .fold(MAX_RANGE_CM, f32::min);
        let noise = self.rng.gen_range(-RANGE_NOISE_CM..=RANGE_NOISE_CM);
        (nearest + noise).max(MIN_RANGE_CM)
    }

    fn camera_frame(&mut self) -> CameraFrame {
        let moving = self.wheel_speed_left.abs() > 0.1 || self.wheel_speed_right.abs() > 0.1;
        let turning = (self.wheel_speed_left - self.wheel_speed_right).abs() > 0.2;
        let pixel: [u8; 3] = match (moving, turning) {
            (true, true) => [0, 0, 100],
            (true, false) => [0, 100, 0],
            (false, _) => [100, 0, 0],
        };
        let (width, height) = self.frame_size;
        let data = match &self.frame_cache {
            Some((cached, data)) if *cached == pixel => Arc::clone(data),
            _ => {
                let data: Arc<[u8]> = pixel.repeat((width * height) as usize).into();
                self.frame_cache = Some((pixel, Arc::clone(&data)));
                data
            }
        };
        CameraFrame {
            width,
            height,
            data,
        }
    }

    fn ensure_initialized(&self) -> Result<(), BrainstemError> {
        if self.initialized {
            Ok(())
        } else {
            Err(BrainstemError::hardware(MODEL, "simulator not initialized"))
        }
    }
}

/// Wrap an angle into `(-π, π]`.
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

impl Hardware for SimulatedPicar {
    fn initialize(&mut self) -> Result<(), BrainstemError> {
        info!(
            width = self.frame_size.0,
            height = self.frame_size.1,
            obstacles = self.obstacles.len(),
            "initializing simulated PiCar-X"
        );
        self.started = Instant::now();
        self.initialized = true;
        Ok(())
    }

    fn read_sensors(&mut self) -> Result<SensorSnapshot, BrainstemError> {
        self.ensure_initialized()?;
        let snapshot = SensorSnapshot {
            timestamp: Utc::now(),
            battery_voltage: self.battery_voltage(),
            ultrasonic_distance: self.ultrasonic_distance(),
            power_source: if self.power_connected {
                PowerSource::External
            } else {
                PowerSource::Battery
            },
            motor_current: (
                self.wheel_speed_left.abs() * 0.5,
                self.wheel_speed_right.abs() * 0.5,
            ),
            camera_frame: Some(self.camera_frame()),
            line_sensors: None,
        };
        self.last_reading = Some(snapshot.timestamp);
        Ok(snapshot)
    }

    fn apply(&mut self, command: &ActuationCommand) -> Result<(), BrainstemError> {
        self.ensure_initialized()?;
        self.emergency_stop_active = false;
        self.wheel_speed_left = (f32::from(command.motor_left) - f32::from(MOTOR_NEUTRAL)) / 500.0;
        self.wheel_speed_right =
            (f32::from(command.motor_right) - f32::from(MOTOR_NEUTRAL)) / 500.0;
        self.camera_angle = (f32::from(command.servo_camera) - f32::from(SERVO_NEUTRAL)) / 1000.0;

        let linear = (self.wheel_speed_left + self.wheel_speed_right) / 2.0;
        let angular = (self.wheel_speed_right - self.wheel_speed_left) / WHEELBASE_M;
        self.position.0 += linear * self.orientation.cos() * self.step;
        self.position.1 += linear * self.orientation.sin() * self.step;
        self.orientation = (self.orientation + angular * self.step).rem_euclid(TAU);

        if command.buzzer_active {
            info!("simulated buzzer sounding");
        }
        Ok(())
    }

    fn emergency_stop(&mut self) -> Result<(), BrainstemError> {
        self.wheel_speed_left = 0.0;
        self.wheel_speed_right = 0.0;
        self.emergency_stop_active = true;
        warn!("simulator emergency stop");
        Ok(())
    }

    fn shutdown(&mut self) {
        // Stopping the simulator cannot fail.
        let _ = self.emergency_stop();
        self.initialized = false;
        info!("simulated PiCar-X shut down");
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

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> SimulatedPicar {
        let mut picar = SimulatedPicar::new().with_frame_size(4, 4);
        picar.initialize().unwrap();
        picar
    }

    #[test]
    fn read_before_initialize_is_a_fault() {
        let mut picar = SimulatedPicar::new();
        assert!(matches!(
            picar.read_sensors(),
            Err(BrainstemError::HardwareFault { .. })
        ));
    }

    #[test]
    fn fresh_battery_reads_full() {
        let mut picar = ready();
        let snap = picar.read_sensors().unwrap();
        assert!((snap.battery_voltage - FULL_VOLTAGE).abs() < 0.01);
        assert_eq!(snap.power_source, PowerSource::Battery);
    }

    #[test]
    fn battery_drains_and_floors() {
        let mut picar = ready();
        picar.fast_forward(Duration::from_secs(3600));
        let snap = picar.read_sensors().unwrap();
        assert!((snap.battery_voltage - 11.5).abs() < 0.01);

        picar.fast_forward(Duration::from_secs(100 * 3600));
        let snap = picar.read_sensors().unwrap();
        assert!((snap.battery_voltage - FLOOR_VOLTAGE).abs() < f32::EPSILON);
    }

    #[test]
    fn ultrasonic_sees_obstacle_ahead() {
        let mut picar = ready();
        let snap = picar.read_sensors().unwrap();
        // Obstacle at (2, 0) is dead ahead, 200 cm away.
        assert!((snap.ultrasonic_distance - 200.0).abs() <= RANGE_NOISE_CM);
    }

    #[test]
    fn ultrasonic_reports_max_range_when_clear() {
        let mut picar = SimulatedPicar::new().with_obstacles(vec![(-3.0, 0.0)]);
        picar.initialize().unwrap();
        let snap = picar.read_sensors().unwrap();
        assert!(snap.ultrasonic_distance >= MAX_RANGE_CM - RANGE_NOISE_CM);
    }

    #[test]
    fn ultrasonic_never_reads_below_floor() {
        let mut picar = SimulatedPicar::new().with_obstacles(vec![(0.01, 0.0)]);
        picar.initialize().unwrap();
        let snap = picar.read_sensors().unwrap();
        assert!(snap.ultrasonic_distance >= MIN_RANGE_CM);
    }

    #[test]
    fn forward_command_moves_along_heading() {
        let mut picar = ready();
        picar.apply(&ActuationCommand::drive(2000, 2000)).unwrap();
        let (x, y, heading) = picar.pose();
        // Full speed (1 m/s) for one 0.1 s step.
        assert!((x - 0.1).abs() < 1e-4);
        assert!(y.abs() < 1e-4);
        assert!(heading.abs() < 1e-4);
    }

    #[test]
    fn differential_command_turns_left() {
        let mut picar = ready();
        picar.apply(&ActuationCommand::drive(1400, 1600)).unwrap();
        let (_, _, heading) = picar.pose();
        assert!(heading > 0.0 && heading < PI);
    }

    #[test]
    fn motor_current_follows_wheel_speed() {
        let mut picar = ready();
        picar.apply(&ActuationCommand::drive(2000, 1500)).unwrap();
        let snap = picar.read_sensors().unwrap();
        assert!((snap.motor_current.0 - 0.5).abs() < 1e-4);
        assert!(snap.motor_current.1.abs() < 1e-4);
    }

    #[test]
    fn camera_frame_colour_tracks_motion() {
        let mut picar = ready();
        let stopped = picar.read_sensors().unwrap().camera_frame.unwrap();
        assert_eq!(&stopped.data[..3], &[100, 0, 0]);
        assert_eq!(stopped.data.len(), 4 * 4 * 3);

        picar.apply(&ActuationCommand::drive(1700, 1700)).unwrap();
        let forward = picar.read_sensors().unwrap().camera_frame.unwrap();
        assert_eq!(&forward.data[..3], &[0, 100, 0]);

        picar.apply(&ActuationCommand::drive(1300, 1700)).unwrap();
        let turning = picar.read_sensors().unwrap().camera_frame.unwrap();
        assert_eq!(&turning.data[..3], &[0, 0, 100]);
    }

    #[test]
    fn unchanged_motion_reuses_the_rendered_frame() {
        let mut picar = ready();
        let first = picar.read_sensors().unwrap().camera_frame.unwrap();
        let second = picar.read_sensors().unwrap().camera_frame.unwrap();
        assert!(Arc::ptr_eq(&first.data, &second.data));

        picar.apply(&ActuationCommand::drive(1700, 1700)).unwrap();
        let moving = picar.read_sensors().unwrap().camera_frame.unwrap();
        assert!(!Arc::ptr_eq(&first.data, &moving.data));
        assert_eq!(moving.data.len(), 4 * 4 * 3);
    }

    #[test]
    fn emergency_stop_latches_until_next_command() {
        let mut picar = ready();
        picar.apply(&ActuationCommand::drive(1800, 1800)).unwrap();
        picar.emergency_stop().unwrap();
        assert!(picar.status().emergency_stop_active);
        let snap = picar.read_sensors().unwrap();
        assert_eq!(snap.motor_current, (0.0, 0.0));

        picar.apply(&ActuationCommand::full_stop()).unwrap();
        assert!(!picar.status().emergency_stop_active);
    }

    #[test]
    fn power_source_follows_connection() {
        let mut picar = ready();
        picar.connect_power();
        assert_eq!(picar.read_sensors().unwrap().power_source, PowerSource::External);
        picar.disconnect_power();
        assert_eq!(picar.read_sensors().unwrap().power_source, PowerSource::Battery);
    }

    #[test]
    fn shutdown_deinitializes() {
        let mut picar = ready();
        picar.shutdown();
        let status = picar.status();
        assert!(!status.initialized);
        assert!(status.emergency_stop_active);
    }

    #[test]
    fn wrap_angle_stays_in_half_open_range() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!((wrap_angle(-PI / 4.0) + PI / 4.0).abs() < 1e-5);
    }
}

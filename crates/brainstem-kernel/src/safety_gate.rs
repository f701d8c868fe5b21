//! [`SafetyGate`] – the reflex check every cycle must pass first.
//!
//! The gate evaluates two independent conditions, each sufficient on its own
//! to demand an immediate full stop:
//!
//! 1. **Critical battery** – the battery voltage is below
//!    [`SafetyGate::battery_critical`].
//! 2. **Imminent collision** – the forward obstacle distance is below
//!    [`SafetyGate::obstacle_critical`].
//!
//! A reading that is not a number is treated as breaching its threshold.  The
//! gate holds no state and is never skipped, cached or rate-limited by the
//! control loop.
//!
//! # Example
//!
//! ```
//! use brainstem_kernel::SafetyGate;
//! use brainstem_types::SensorSnapshot;
//!
//! let gate = SafetyGate::default();
//!
//! // Healthy battery, clear path → no danger.
//! assert!(!gate.is_immediate_danger(&SensorSnapshot::basic(12.0, 150.0)));
//!
//! // 5 cm from a wall → stop.
//! assert!(gate.is_immediate_danger(&SensorSnapshot::basic(12.0, 5.0)));
//! ```

use brainstem_types::{DangerReason, SensorSnapshot};
use tracing::warn;

/// Default critical battery threshold (V).
pub const DEFAULT_BATTERY_CRITICAL: f32 = 10.5;
/// Default critical obstacle threshold (cm).
pub const DEFAULT_OBSTACLE_CRITICAL: f32 = 10.0;

/// Stateless threshold check over a [`SensorSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyGate {
    /// Below this voltage the robot must stop.
    pub battery_critical: f32,
    /// Below this distance (cm) the robot must stop.
    pub obstacle_critical: f32,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self {
            battery_critical: DEFAULT_BATTERY_CRITICAL,
            obstacle_critical: DEFAULT_OBSTACLE_CRITICAL,
        }
    }
}

impl SafetyGate {
    pub fn new(battery_critical: f32, obstacle_critical: f32) -> Self {
        Self {
            battery_critical,
            obstacle_critical,
        }
    }

    /// Return the first breached condition, battery before obstacle, or
    /// `None` when the snapshot is safe.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn assess(&self, snapshot: &SensorSnapshot) -> Option<DangerReason> {
        if !(snapshot.battery_voltage >= self.battery_critical) {
            return Some(DangerReason::CriticalBattery {
                voltage: snapshot.battery_voltage,
            });
        }
        if !(snapshot.ultrasonic_distance >= self.obstacle_critical) {
            return Some(DangerReason::ImminentCollision {
                distance_cm: snapshot.ultrasonic_distance,
            });
        }
        None
    }

    /// `true` when the robot must stop right now.
    pub fn is_immediate_danger(&self, snapshot: &SensorSnapshot) -> bool {
        match self.assess(snapshot) {
            Some(reason) => {
                warn!(%reason, "safety reflex triggered");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_snapshot_is_safe() {
        let gate = SafetyGate::default();
        let snap = SensorSnapshot::basic(12.0, 200.0);
        assert!(!gate.is_immediate_danger(&snap));
        assert_eq!(gate.assess(&snap), None);
    }

    #[test]
    fn critical_battery_is_danger() {
        let gate = SafetyGate::default();
        let snap = SensorSnapshot::basic(10.0, 200.0);
        assert!(gate.is_immediate_danger(&snap));
        assert!(matches!(
            gate.assess(&snap),
            Some(DangerReason::CriticalBattery { voltage }) if (voltage - 10.0).abs() < f32::EPSILON
        ));
    }

    #[test]
    fn imminent_collision_is_danger() {
        let gate = SafetyGate::default();
        let snap = SensorSnapshot::basic(12.0, 5.0);
        assert!(gate.is_immediate_danger(&snap));
        assert!(matches!(
            gate.assess(&snap),
            Some(DangerReason::ImminentCollision { .. })
        ));
    }

    #[test]
    fn battery_is_reported_before_obstacle() {
        let gate = SafetyGate::default();
        let snap = SensorSnapshot::basic(9.0, 2.0);
        assert!(matches!(
            gate.assess(&snap),
            Some(DangerReason::CriticalBattery { .. })
        ));
    }

    #[test]
    fn exact_thresholds_are_safe() {
        let gate = SafetyGate::default();
        let snap = SensorSnapshot::basic(DEFAULT_BATTERY_CRITICAL, DEFAULT_OBSTACLE_CRITICAL);
        assert!(!gate.is_immediate_danger(&snap));
    }

    #[test]
    fn nan_readings_are_treated_as_breaches() {
        let gate = SafetyGate::default();
        assert!(gate.is_immediate_danger(&SensorSnapshot::basic(f32::NAN, 100.0)));
        assert!(gate.is_immediate_danger(&SensorSnapshot::basic(12.0, f32::NAN)));
    }

    #[test]
    fn threshold_sweep_matches_definition() {
        let gate = SafetyGate::new(10.5, 10.0);
        for tenth_volts in 90..=130 {
            for distance in [0.0_f32, 5.0, 9.99, 10.0, 10.01, 30.0, 400.0] {
                let voltage = tenth_volts as f32 / 10.0;
                let snap = SensorSnapshot::basic(voltage, distance);
                let expected = voltage < 10.5 || distance < 10.0;
                assert_eq!(
                    gate.is_immediate_danger(&snap),
                    expected,
                    "voltage={voltage} distance={distance}"
                );
            }
        }
    }
}

//! [`FallbackPolicy`] – local autonomy when the decision service is silent.
//!
//! Rules are evaluated in priority order and the first match wins:
//!
//! | # | Condition | Rule | Command (L / R µs) |
//! |---|---|---|---|
//! | 1 | obstacle closer than `obstacle_avoid` | [`FallbackRule::AvoidObstacle`] | 1400 / 1600 |
//! | 2 | battery below `battery_low` | [`FallbackRule::Hold`] | 1500 / 1500 |
//! | 3 | otherwise | [`FallbackRule::Explore`] | 1530 / 1530 |
//!
//! `Hold` is a placeholder for power seeking: it parks the robot rather than
//! navigating anywhere.  The policy is pure and total; NaN readings fall into
//! the most cautious matching rule.

use std::fmt;

use brainstem_types::{ActuationCommand, SensorSnapshot};

/// Default near-field avoidance threshold (cm).
pub const DEFAULT_OBSTACLE_AVOID: f32 = 30.0;
/// Default low-battery threshold (V).
pub const DEFAULT_BATTERY_LOW: f32 = 11.5;

const AVOID_LEFT: u16 = 1400;
const AVOID_RIGHT: u16 = 1600;
const EXPLORE_LEVEL: u16 = 1530;

/// Which fallback rule produced a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackRule {
    /// Turn left away from a near obstacle.
    AvoidObstacle,
    /// Park with neutral outputs while the battery is low.
    Hold,
    /// Creep forward.
    Explore,
}

impl FallbackRule {
    /// The command this rule always issues.
    pub fn command(self) -> ActuationCommand {
        match self {
            FallbackRule::AvoidObstacle => ActuationCommand::drive(AVOID_LEFT, AVOID_RIGHT),
            FallbackRule::Hold => ActuationCommand::full_stop(),
            FallbackRule::Explore => ActuationCommand::drive(EXPLORE_LEVEL, EXPLORE_LEVEL),
        }
    }
}

impl fmt::Display for FallbackRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackRule::AvoidObstacle => write!(f, "avoid_obstacle"),
            FallbackRule::Hold => write!(f, "hold"),
            FallbackRule::Explore => write!(f, "explore"),
        }
    }
}

/// Deterministic local decision function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackPolicy {
    /// Obstacles nearer than this (cm) trigger avoidance.
    pub obstacle_avoid: f32,
    /// Voltages below this trigger the hold behaviour.
    pub battery_low: f32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            obstacle_avoid: DEFAULT_OBSTACLE_AVOID,
            battery_low: DEFAULT_BATTERY_LOW,
        }
    }
}

impl FallbackPolicy {
    pub fn new(obstacle_avoid: f32, battery_low: f32) -> Self {
        Self {
            obstacle_avoid,
            battery_low,
        }
    }

    /// Select the first matching rule for `snapshot`.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn rule(&self, snapshot: &SensorSnapshot) -> FallbackRule {
        if !(snapshot.ultrasonic_distance >= self.obstacle_avoid) {
            FallbackRule::AvoidObstacle
        } else if !(snapshot.battery_voltage >= self.battery_low) {
            FallbackRule::Hold
        } else {
            FallbackRule::Explore
        }
    }

    /// The command to issue for `snapshot`.
    pub fn decide(&self, snapshot: &SensorSnapshot) -> ActuationCommand {
        self.rule(snapshot).command()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_types::{MOTOR_NEUTRAL, SERVO_NEUTRAL};

    #[test]
    fn near_obstacle_turns_away() {
        let policy = FallbackPolicy::default();
        let snap = SensorSnapshot::basic(12.0, 20.0);
        assert_eq!(policy.rule(&snap), FallbackRule::AvoidObstacle);
        let cmd = policy.decide(&snap);
        assert!(cmd.motor_left < MOTOR_NEUTRAL);
        assert!(cmd.motor_right > MOTOR_NEUTRAL);
    }

    #[test]
    fn low_battery_holds() {
        let policy = FallbackPolicy::default();
        let snap = SensorSnapshot::basic(11.0, 200.0);
        assert_eq!(policy.rule(&snap), FallbackRule::Hold);
        assert!(policy.decide(&snap).is_stationary());
    }

    #[test]
    fn clear_path_explores_slowly_forward() {
        let policy = FallbackPolicy::default();
        let cmd = policy.decide(&SensorSnapshot::basic(12.2, 200.0));
        assert_eq!(cmd.motor_left, EXPLORE_LEVEL);
        assert_eq!(cmd.motor_right, EXPLORE_LEVEL);
        assert_eq!(cmd.servo_camera, SERVO_NEUTRAL);
        assert!(!cmd.buzzer_active);
    }

    #[test]
    fn obstacle_takes_precedence_over_low_battery() {
        let policy = FallbackPolicy::default();
        let snap = SensorSnapshot::basic(11.0, 15.0);
        assert_eq!(policy.rule(&snap), FallbackRule::AvoidObstacle);
    }

    #[test]
    fn same_snapshot_same_command() {
        let policy = FallbackPolicy::default();
        let snap = SensorSnapshot::basic(11.7, 45.0);
        let first = policy.decide(&snap);
        for _ in 0..10 {
            assert_eq!(policy.decide(&snap), first);
        }
    }

    #[test]
    fn every_reading_maps_to_exactly_one_rule() {
        let policy = FallbackPolicy::default();
        let readings = [f32::NAN, -1.0, 0.0, 10.0, 29.9, 30.0, 11.49, 11.5, 400.0];
        for &voltage in &readings {
            for &distance in &readings {
                let snap = SensorSnapshot::basic(voltage, distance);
                assert_eq!(policy.decide(&snap), policy.rule(&snap).command());
            }
        }
    }

    #[test]
    fn nan_distance_is_treated_as_near() {
        let policy = FallbackPolicy::default();
        let snap = SensorSnapshot::basic(12.0, f32::NAN);
        assert_eq!(policy.rule(&snap), FallbackRule::AvoidObstacle);
    }

    #[test]
    fn rule_names_display() {
        assert_eq!(FallbackRule::Hold.to_string(), "hold");
        assert_eq!(FallbackRule::AvoidObstacle.to_string(), "avoid_obstacle");
    }
}

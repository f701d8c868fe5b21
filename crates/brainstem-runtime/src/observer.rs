//! [`LoopObserver`] – structured events emitted by the control loop.
//!
//! The loop calls the observer on its existing cadences and never reads
//! anything back, so observers cannot influence decisions.  The default
//! [`TracingObserver`] turns every event into a `tracing` record.

use std::time::Duration;

use brainstem_hal::HardwareStatus;
use brainstem_link::LinkStats;
use brainstem_types::DangerReason;
use tracing::{info, warn};

use crate::control_loop::{LoopState, PerformanceStats};

/// Lightweight periodic status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub cycle: u64,
    pub state: LoopState,
    pub battery_voltage: f32,
    pub ultrasonic_distance: f32,
    pub avg_latency: Option<Duration>,
    /// Elapsed time of the current isolation episode, if any.
    pub isolated_for: Option<Duration>,
}

/// Detailed periodic diagnostic report.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    pub performance: PerformanceStats,
    pub link: LinkStats,
    pub hardware: HardwareStatus,
}

pub trait LoopObserver: Send {
    fn on_status(&mut self, status: &StatusLine);

    fn on_report(&mut self, report: &LoopReport);

    /// A cycle took longer than the slow-cycle limit.
    fn on_slow_cycle(&mut self, cycle: u64, elapsed: Duration, target: Duration);

    /// The safety gate forced a full stop.
    fn on_emergency(&mut self, cycle: u64, reason: &DangerReason);

    /// A session was re-established after `isolated_for`.
    fn on_reconnected(&mut self, cycle: u64, isolated_for: Duration);

    /// An isolation episode began.
    fn on_isolated(&mut self, cycle: u64);
}

fn millis(d: Option<Duration>) -> f64 {
    d.map(|d| d.as_secs_f64() * 1000.0).unwrap_or(0.0)
}

/// Logs every loop event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoopObserver for TracingObserver {
    fn on_status(&mut self, status: &StatusLine) {
        info!(
            cycle = status.cycle,
            state = %status.state,
            battery_v = status.battery_voltage,
            distance_cm = status.ultrasonic_distance,
            latency_ms = millis(status.avg_latency),
            isolated_s = status.isolated_for.map(|d| d.as_secs_f64()).unwrap_or(0.0),
            "status"
        );
    }

    fn on_report(&mut self, report: &LoopReport) {
        let perf = &report.performance;
        info!(
            uptime_s = perf.uptime.as_secs(),
            cycles = perf.total_cycles,
            state = %perf.state,
            communication_errors = perf.communication_errors,
            avg_latency_ms = millis(perf.avg_response),
            link = %report.link,
            hardware = %report.hardware,
            "performance report"
        );
    }

    fn on_slow_cycle(&mut self, cycle: u64, elapsed: Duration, target: Duration) {
        warn!(
            cycle,
            elapsed_ms = elapsed.as_millis() as u64,
            target_ms = target.as_millis() as u64,
            "slow cycle"
        );
    }

    fn on_emergency(&mut self, cycle: u64, reason: &DangerReason) {
        warn!(cycle, %reason, "safety reflex: full stop");
    }

    fn on_reconnected(&mut self, cycle: u64, isolated_for: Duration) {
        info!(
            cycle,
            isolated_s = isolated_for.as_secs_f64(),
            "decision service reconnected"
        );
    }

    fn on_isolated(&mut self, cycle: u64) {
        warn!(cycle, "decision service unavailable; running on local fallback");
    }
}

//! [`ControlLoop`] – the fixed-rate sense → decide → act cycle.
//!
//! Each cycle:
//!
//! 1. **Sense** – read one [`SensorSnapshot`] from the [`Hardware`] backend.
//! 2. **Reflex** – run the [`SafetyGate`].  On danger the backend is
//!    emergency-stopped and nothing else happens this cycle; [`run`] then
//!    waits out the safety cooldown.
//! 3. **Decide** – while [`LoopState::Connected`] the [`DecisionService`] is
//!    asked for a command.  When it has none, the [`FallbackPolicy`] supplies
//!    one; if the session itself is gone the loop also enters
//!    [`LoopState::Isolated`].  While isolated, the fallback drives and a
//!    reconnect is attempted every `reconnect_interval` of wall-clock time.
//! 4. **Report** – status lines and detailed reports go to the
//!    [`LoopObserver`] on cycle-count cadences.
//! 5. **Pace** – [`run`] sleeps until the next period boundary, counted from
//!    a fixed deadline so timer overshoot does not accumulate.  A cycle that
//!    overran starts the next one immediately (no catch-up bursts) and is
//!    flagged as slow when it took more than `slow_cycle_factor` periods.
//!
//! A cycle that fails (`tick` returns `Err`) is a cycle fault: [`run`] forces
//! an emergency stop, counts the error, pauses for `recovery_pause` and
//! carries on.  Only the shutdown flag ends the loop.
//!
//! [`run`]: ControlLoop::run

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use brainstem_hal::Hardware;
use brainstem_kernel::{FallbackPolicy, FallbackRule, SafetyGate};
use brainstem_link::DecisionService;
use brainstem_types::{ActuationCommand, BrainstemError, DangerReason, SensorSnapshot};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::latency::{DEFAULT_CAPACITY, LatencyWindow};
use crate::observer::{LoopObserver, LoopReport, StatusLine, TracingObserver};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Accepted range for [`LoopConfig::loop_hz`].
pub const LOOP_HZ_RANGE: std::ops::RangeInclusive<f64> = 0.1..=1000.0;
/// Accepted range for [`LoopConfig::slow_cycle_factor`].
pub const SLOW_CYCLE_FACTOR_RANGE: std::ops::RangeInclusive<f64> = 1.0..=100.0;

/// Timing and cadence settings for [`ControlLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Target cycle frequency (Hz).
    pub loop_hz: f64,
    /// Pause after a safety stop before the next cycle.
    pub safety_cooldown: Duration,
    /// Pause after a cycle fault before the next cycle.
    pub recovery_pause: Duration,
    /// Minimum wall-clock gap between reconnect attempts while isolated.
    pub reconnect_interval: Duration,
    pub status_every: Duration,
    pub report_every: Duration,
    /// Connect attempts made by [`ControlLoop::start`].
    pub startup_attempts: u32,
    pub startup_retry_delay: Duration,
    /// Number of latency samples kept for averaging.
    pub latency_window: usize,
    /// A cycle longer than `period * slow_cycle_factor` is reported as slow.
    pub slow_cycle_factor: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            loop_hz: 10.0,
            safety_cooldown: Duration::from_secs(1),
            recovery_pause: Duration::from_millis(500),
            reconnect_interval: Duration::from_secs(30),
            status_every: Duration::from_secs(5),
            report_every: Duration::from_secs(30),
            startup_attempts: 3,
            startup_retry_delay: Duration::from_secs(2),
            latency_window: DEFAULT_CAPACITY,
            slow_cycle_factor: 1.5,
        }
    }
}

impl LoopConfig {
    /// # Errors
    ///
    /// [`BrainstemError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), BrainstemError> {
        let invalid = |msg: &str| Err(BrainstemError::InvalidConfig(msg.to_string()));
        if !LOOP_HZ_RANGE.contains(&self.loop_hz) {
            return invalid("loop frequency must be between 0.1 and 1000 Hz");
        }
        if !SLOW_CYCLE_FACTOR_RANGE.contains(&self.slow_cycle_factor) {
            return invalid("slow cycle factor must be between 1.0 and 100.0");
        }
        if self.reconnect_interval.is_zero() {
            return invalid("reconnect interval must be greater than zero");
        }
        if self.status_every.is_zero() || self.report_every.is_zero() {
            return invalid("status and report cadences must be greater than zero");
        }
        Ok(())
    }

    /// Target duration of one cycle.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.loop_hz)
    }

    /// Number of cycles spanning `span` at the configured rate, at least 1.
    pub fn cycles_for(&self, span: Duration) -> u64 {
        ((span.as_secs_f64() * self.loop_hz).round() as u64).max(1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State & outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Connection state of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Before the startup connection attempts have resolved.
    Connecting,
    /// A session to the decision service is live.
    Connected,
    /// No session; the fallback policy is in charge.
    Isolated,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Connecting => write!(f, "CONNECTING"),
            LoopState::Connected => write!(f, "CONNECTED"),
            LoopState::Isolated => write!(f, "ISOLATED"),
        }
    }
}

/// Which decision source acted in a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    SafetyStop { reason: DangerReason },
    Remote { command: ActuationCommand },
    Fallback {
        command: ActuationCommand,
        rule: FallbackRule,
    },
}

impl CycleOutcome {
    /// The command the cycle issued; a safety stop counts as full stop.
    pub fn command(&self) -> ActuationCommand {
        match self {
            CycleOutcome::SafetyStop { .. } => ActuationCommand::full_stop(),
            CycleOutcome::Remote { command } | CycleOutcome::Fallback { command, .. } => *command,
        }
    }
}

/// Snapshot of loop health.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceStats {
    pub uptime: Duration,
    pub total_cycles: u64,
    pub state: LoopState,
    pub connected: bool,
    pub communication_errors: u64,
    pub avg_response: Option<Duration>,
    /// Elapsed time of the current isolation episode.
    pub isolation_duration: Option<Duration>,
    /// Length of the most recently completed isolation episode.
    pub last_isolation: Option<Duration>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop<H, L> {
    config: LoopConfig,
    hardware: H,
    link: L,
    gate: SafetyGate,
    policy: FallbackPolicy,
    observer: Box<dyn LoopObserver>,
    state: LoopState,
    cycle: u64,
    started: Instant,
    isolation_start: Option<Instant>,
    last_connect_attempt: Option<Instant>,
    last_isolation: Option<Duration>,
    latencies: LatencyWindow,
    communication_errors: u64,
    status_cycles: u64,
    report_cycles: u64,
}

impl<H: Hardware, L: DecisionService> ControlLoop<H, L> {
    /// # Errors
    ///
    /// Returns [`BrainstemError::InvalidConfig`] when `config` fails
    /// [`LoopConfig::validate`].
    pub fn new(
        config: LoopConfig,
        hardware: H,
        link: L,
        gate: SafetyGate,
        policy: FallbackPolicy,
    ) -> Result<Self, BrainstemError> {
        config.validate()?;
        Ok(Self {
            status_cycles: config.cycles_for(config.status_every),
            report_cycles: config.cycles_for(config.report_every),
            latencies: LatencyWindow::new(config.latency_window),
            config,
            hardware,
            link,
            gate,
            policy,
            observer: Box::new(TracingObserver),
            state: LoopState::Connecting,
            cycle: 0,
            started: Instant::now(),
            isolation_start: None,
            last_connect_attempt: None,
            last_isolation: None,
            communication_errors: 0,
        })
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Box<dyn LoopObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Start of the current isolation episode; `None` while connected.
    pub fn isolation_started(&self) -> Option<Instant> {
        self.isolation_start
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    pub fn latencies(&self) -> &LatencyWindow {
        &self.latencies
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn performance(&self) -> PerformanceStats {
        PerformanceStats {
            uptime: self.started.elapsed(),
            total_cycles: self.cycle,
            state: self.state,
            connected: self.state == LoopState::Connected,
            communication_errors: self.communication_errors,
            avg_response: self.latencies.average(),
            isolation_duration: self.isolation_start.map(|t| t.elapsed()),
            last_isolation: self.last_isolation,
        }
    }

    /// Resolve `Connecting` with up to `startup_attempts` connects.
    pub async fn start(&mut self) -> LoopState {
        self.state = LoopState::Connecting;
        let attempts = self.config.startup_attempts;
        for attempt in 1..=attempts {
            info!(attempt, of = attempts, "connecting to decision service");
            if self.link.connect().await {
                self.state = LoopState::Connected;
                self.isolation_start = None;
                info!(link = %self.link.stats(), "control loop connected");
                return self.state;
            }
            if attempt < attempts {
                sleep(self.config.startup_retry_delay).await;
            }
        }
        warn!(attempts, "decision service unreachable; starting in autonomous mode");
        self.begin_isolation().await;
        self.state
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// Propagates sensor read and emergency-stop failures.  A failed
    /// [`Hardware::apply`] is logged and does not fail the cycle.
    pub async fn tick(&mut self) -> Result<CycleOutcome, BrainstemError> {
        self.cycle += 1;
        let snapshot = self.hardware.read_sensors()?;

        if let Some(reason) = self.gate.assess(&snapshot) {
            self.hardware.emergency_stop()?;
            self.observer.on_emergency(self.cycle, &reason);
            self.emit_cadenced(&snapshot);
            return Ok(CycleOutcome::SafetyStop { reason });
        }

        if self.state == LoopState::Connecting {
            self.begin_isolation().await;
        }

        let outcome = match self.state {
            LoopState::Connected => self.consult_service(&snapshot).await,
            LoopState::Connecting | LoopState::Isolated => self.run_autonomous(&snapshot).await,
        };

        self.emit_cadenced(&snapshot);
        Ok(outcome)
    }

    /// Drive cycles at the configured rate until `shutdown` is set, then stop
    /// the hardware and close the session.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        if self.state == LoopState::Connecting && !shutdown.load(Ordering::SeqCst) {
            self.start().await;
        }

        let period = self.config.period();
        let slow_limit = period.mul_f64(self.config.slow_cycle_factor);
        info!(hz = self.config.loop_hz, state = %self.state, "control loop running");

        let mut deadline = Instant::now();
        while !shutdown.load(Ordering::SeqCst) {
            let began = Instant::now();
            let span = info_span!("cycle", cycle = self.cycle + 1);

            match self.tick().instrument(span).await {
                Ok(CycleOutcome::SafetyStop { .. }) => {
                    sleep(self.config.safety_cooldown).await;
                    deadline = Instant::now();
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    self.recover(e).await;
                    deadline = Instant::now();
                    continue;
                }
            }

            let elapsed = began.elapsed();
            if elapsed > slow_limit {
                self.observer.on_slow_cycle(self.cycle, elapsed, period);
            }

            deadline += period;
            let now = Instant::now();
            if deadline > now {
                sleep_until(deadline).await;
            } else {
                deadline = now;
            }
        }

        self.stop().await;
    }

    /// Bring the robot to rest and close the session.
    pub async fn stop(&mut self) {
        info!("control loop stopping");
        self.actuate(&ActuationCommand::full_stop());
        self.hardware.shutdown();
        self.link.disconnect().await;
        let perf = self.performance();
        info!(
            cycles = perf.total_cycles,
            communication_errors = perf.communication_errors,
            uptime_s = perf.uptime.as_secs(),
            "control loop stopped"
        );
    }

    // ── decision phases ──────────────────────────────────────────────────────

    async fn consult_service(&mut self, snapshot: &SensorSnapshot) -> CycleOutcome {
        let sent = Instant::now();
        match self.link.exchange(snapshot).await {
            Some(command) => {
                self.latencies.record(sent.elapsed());
                self.isolation_start = None;
                self.actuate(&command);
                CycleOutcome::Remote { command }
            }
            None => {
                self.communication_errors += 1;
                if !self.link.is_connected() {
                    self.begin_isolation().await;
                }
                self.fallback(snapshot)
            }
        }
    }

    async fn run_autonomous(&mut self, snapshot: &SensorSnapshot) -> CycleOutcome {
        let outcome = self.fallback(snapshot);

        let now = Instant::now();
        if self.reconnect_due(now) {
            self.last_connect_attempt = Some(now);
            debug!(cycle = self.cycle, "attempting reconnect");
            if self.link.connect().await {
                self.end_isolation();
            }
        }
        outcome
    }

    fn fallback(&mut self, snapshot: &SensorSnapshot) -> CycleOutcome {
        let rule = self.policy.rule(snapshot);
        let command = rule.command();
        debug!(%rule, "fallback decision");
        self.actuate(&command);
        CycleOutcome::Fallback { command, rule }
    }

    fn actuate(&mut self, command: &ActuationCommand) {
        if let Err(e) = self.hardware.apply(command) {
            warn!(error = %e, "actuation failed");
        }
    }

    // ── state transitions ────────────────────────────────────────────────────

    fn reconnect_due(&self, now: Instant) -> bool {
        match self.last_connect_attempt.or(self.isolation_start) {
            Some(since) => now.duration_since(since) >= self.config.reconnect_interval,
            None => true,
        }
    }

    async fn begin_isolation(&mut self) {
        self.state = LoopState::Isolated;
        if self.isolation_start.is_none() {
            self.isolation_start = Some(Instant::now());
        }
        self.last_connect_attempt = None;
        self.link.disconnect().await;
        self.observer.on_isolated(self.cycle);
    }

    fn end_isolation(&mut self) {
        self.state = LoopState::Connected;
        let isolated_for = self
            .isolation_start
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        self.last_isolation = Some(isolated_for);
        self.observer.on_reconnected(self.cycle, isolated_for);
    }

    async fn recover(&mut self, fault: BrainstemError) {
        self.communication_errors += 1;
        error!(cycle = self.cycle, error = %fault, "cycle fault; forcing full stop");
        if let Err(e) = self.hardware.emergency_stop() {
            error!(error = %e, "emergency stop failed");
        }
        sleep(self.config.recovery_pause).await;
    }

    // ── reporting ────────────────────────────────────────────────────────────

    fn emit_cadenced(&mut self, snapshot: &SensorSnapshot) {
        if self.cycle % self.status_cycles == 0 {
            let status = StatusLine {
                cycle: self.cycle,
                state: self.state,
                battery_voltage: snapshot.battery_voltage,
                ultrasonic_distance: snapshot.ultrasonic_distance,
                avg_latency: self.latencies.average(),
                isolated_for: self.isolation_start.map(|t| t.elapsed()),
            };
            self.observer.on_status(&status);
        }
        if self.cycle % self.report_cycles == 0 {
            let report = LoopReport {
                performance: self.performance(),
                link: self.link.stats(),
                hardware: self.hardware.status(),
            };
            self.observer.on_report(&report);
        }
    }
}

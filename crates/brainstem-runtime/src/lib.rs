//! `brainstem-runtime` – the control loop that keeps the robot moving.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`]: fixed-rate sense → reflex → decide →
//!   act cycle, arbitrating between the [`SafetyGate`], the remote
//!   [`DecisionService`][brainstem_link::DecisionService] and the local
//!   [`FallbackPolicy`].
//! - [`latency`] – [`LatencyWindow`]: rolling round-trip latency samples.
//! - [`observer`] – [`LoopObserver`]: status, report, slow-cycle, emergency
//!   and connectivity events, with [`TracingObserver`] as the default sink.
//! - [`telemetry`] – [`init_tracing`]: subscriber and OTLP export setup.

pub mod control_loop;
pub mod latency;
pub mod observer;
pub mod telemetry;

pub use control_loop::{ControlLoop, CycleOutcome, LoopConfig, LoopState, PerformanceStats};
pub use latency::LatencyWindow;
pub use observer::{LoopObserver, LoopReport, StatusLine, TracingObserver};
pub use telemetry::{LogFormat, TelemetryGuard, TelemetrySettings, init_tracing};

// Re-exported so binaries can assemble a loop from this crate alone.
pub use brainstem_kernel::{FallbackPolicy, SafetyGate};

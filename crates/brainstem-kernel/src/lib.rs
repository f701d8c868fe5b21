//! `brainstem-kernel` – local, non-negotiable decision making.
//!
//! Nothing in this crate touches the network or the clock.  Both components
//! are pure functions of the current [`SensorSnapshot`][brainstem_types::SensorSnapshot].
//!
//! # Modules
//!
//! - [`safety_gate`] – [`SafetyGate`][safety_gate::SafetyGate]: the reflex
//!   check run first in every cycle.  A positive result forces a full stop
//!   and suppresses every other decision source for that cycle.
//! - [`fallback`] – [`FallbackPolicy`][fallback::FallbackPolicy]: the
//!   deterministic rule list that drives the robot whenever the remote
//!   decision service did not produce a command.

pub mod fallback;
pub mod safety_gate;

pub use fallback::{FallbackPolicy, FallbackRule};
pub use safety_gate::SafetyGate;

//! `brainstem-hal` – hardware capability layer.
//!
//! The control core never knows which robot body it is driving.  It talks to
//! a [`Hardware`] trait object chosen once at startup by [`select_backend`].
//!
//! # Modules
//!
//! - [`hardware`] – the [`Hardware`] capability trait and the
//!   [`HardwareStatus`] diagnostic record.
//! - [`sim`] – [`SimulatedPicar`][sim::SimulatedPicar]: a differential-drive
//!   kinematic simulation with a battery model and a noisy ultrasonic ranger.
//! - [`replay`] – [`ReplayHardware`][replay::ReplayHardware]: plays back
//!   recorded snapshots and records every command it is given.
//! - [`backend`] – [`BackendKind`] and the [`select_backend`] factory.

pub mod backend;
pub mod hardware;
pub mod replay;
pub mod sim;

pub use backend::{BackendKind, select_backend};
pub use hardware::{Hardware, HardwareStatus};
pub use replay::{Actuation, ReplayHardware};
pub use sim::SimulatedPicar;

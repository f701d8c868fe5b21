//! # brainstem-link
//!
//! The robot's connection to the remote decision service.
//!
//! - [`protocol`] – the MessagePack request/reply frames.
//! - [`DecisionService`] – the capability the control loop depends on.
//! - [`DecisionLink`] – the WebSocket implementation of that capability.

pub mod link;
pub mod protocol;
pub mod service;

pub use link::{DecisionLink, LinkConfig};
pub use service::{DecisionService, LinkStats};

//! [`select_backend`] – one-shot hardware selection at process start.
//!
//! The configured [`BackendKind`] is resolved into a concrete, initialised
//! [`Hardware`] implementation and handed back as a trait object.  Nothing
//! downstream ever inspects which variant was chosen.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use brainstem_types::BrainstemError;
use tracing::info;

use crate::hardware::Hardware;
use crate::replay::ReplayHardware;
use crate::sim::SimulatedPicar;

/// Which robot body to drive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// The in-process PiCar-X simulation.
    #[default]
    Simulator,
    /// Replay a JSON snapshot script from disk.
    Replay { path: PathBuf },
}

impl FromStr for BackendKind {
    type Err = BrainstemError;

    /// Parses `"simulator"` (or `"sim"`) and `"replay:<path>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "simulator" | "sim" => Ok(BackendKind::Simulator),
            _ => match s.strip_prefix("replay:") {
                Some(path) if !path.is_empty() => Ok(BackendKind::Replay {
                    path: PathBuf::from(path),
                }),
                _ => Err(BrainstemError::InvalidConfig(format!(
                    "unknown hardware backend '{s}' (expected 'simulator' or 'replay:<path>')"
                ))),
            },
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Simulator => write!(f, "simulator"),
            BackendKind::Replay { path } => write!(f, "replay:{}", path.display()),
        }
    }
}

/// Construct and initialise the backend named by `kind`.
///
/// # Errors
///
/// Returns [`BrainstemError::HardwareFault`] when the backend cannot be built
/// or its `initialize` call fails.
pub fn select_backend(kind: &BackendKind) -> Result<Box<dyn Hardware>, BrainstemError> {
    let mut hardware: Box<dyn Hardware> = match kind {
        BackendKind::Simulator => Box::new(SimulatedPicar::new()),
        BackendKind::Replay { path } => Box::new(ReplayHardware::from_json_file(path)?),
    };
    hardware.initialize()?;
    info!(backend = %kind, model = %hardware.status().model, "hardware backend ready");
    Ok(hardware)
}

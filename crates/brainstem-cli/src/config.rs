//! Robot configuration – reads `~/.brainstem/config.toml`.
//!
//! Every field has a default, so a missing file, an empty file or a file
//! holding a single section are all valid.  Values are read once at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use brainstem_hal::BackendKind;
use brainstem_kernel::fallback::{DEFAULT_BATTERY_LOW, DEFAULT_OBSTACLE_AVOID};
use brainstem_kernel::safety_gate::{DEFAULT_BATTERY_CRITICAL, DEFAULT_OBSTACLE_CRITICAL};
use brainstem_kernel::{FallbackPolicy, SafetyGate};
use brainstem_link::LinkConfig;
use brainstem_link::link::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_ENDPOINT, DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_ROBOT_ID,
    DEFAULT_SLOW_RESPONSE_WARN,
};
use brainstem_runtime::{LogFormat, LoopConfig, TelemetrySettings};
use brainstem_types::BrainstemError;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[link]` – the decision service session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    pub endpoint: String,
    pub robot_id: String,
    pub connect_timeout_ms: u64,
    pub exchange_timeout_ms: u64,
    pub slow_response_warn_ms: u64,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            robot_id: DEFAULT_ROBOT_ID.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            exchange_timeout_ms: DEFAULT_EXCHANGE_TIMEOUT.as_millis() as u64,
            slow_response_warn_ms: DEFAULT_SLOW_RESPONSE_WARN.as_millis() as u64,
        }
    }
}

/// `[control]` – loop rate, pauses and cadences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub loop_hz: f64,
    pub safety_cooldown_ms: u64,
    pub recovery_pause_ms: u64,
    pub reconnect_interval_s: u64,
    pub status_every_s: u64,
    pub report_every_s: u64,
    pub startup_attempts: u32,
    pub startup_retry_delay_ms: u64,
    pub latency_window: usize,
    pub slow_cycle_factor: f64,
}

impl Default for ControlSection {
    fn default() -> Self {
        let defaults = LoopConfig::default();
        Self {
            loop_hz: defaults.loop_hz,
            safety_cooldown_ms: defaults.safety_cooldown.as_millis() as u64,
            recovery_pause_ms: defaults.recovery_pause.as_millis() as u64,
            reconnect_interval_s: defaults.reconnect_interval.as_secs(),
            status_every_s: defaults.status_every.as_secs(),
            report_every_s: defaults.report_every.as_secs(),
            startup_attempts: defaults.startup_attempts,
            startup_retry_delay_ms: defaults.startup_retry_delay.as_millis() as u64,
            latency_window: defaults.latency_window,
            slow_cycle_factor: defaults.slow_cycle_factor,
        }
    }
}

/// `[safety]` – reflex thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySection {
    pub battery_critical: f32,
    pub obstacle_critical: f32,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            battery_critical: DEFAULT_BATTERY_CRITICAL,
            obstacle_critical: DEFAULT_OBSTACLE_CRITICAL,
        }
    }
}

/// `[fallback]` – local policy thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    pub battery_low: f32,
    pub obstacle_avoid: f32,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self {
            battery_low: DEFAULT_BATTERY_LOW,
            obstacle_avoid: DEFAULT_OBSTACLE_AVOID,
        }
    }
}

/// `[hardware]` – `"simulator"` or `"replay:<path>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSection {
    pub backend: String,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default().to_string(),
        }
    }
}

/// `[telemetry]` – log format and optional OTLP export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    pub service_name: String,
    pub log_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: "brainstem".to_string(),
            log_format: "compact".to_string(),
            otlp_endpoint: None,
        }
    }
}

/// Complete configuration as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkSection,
    pub control: ControlSection,
    pub safety: SafetySection,
    pub fallback: FallbackSection,
    pub hardware: HardwareSection,
    pub telemetry: TelemetrySection,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion & validation
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            endpoint: self.link.endpoint.clone(),
            robot_id: self.link.robot_id.clone(),
            connect_timeout: Duration::from_millis(self.link.connect_timeout_ms),
            exchange_timeout: Duration::from_millis(self.link.exchange_timeout_ms),
            slow_response_warn: Duration::from_millis(self.link.slow_response_warn_ms),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        let c = &self.control;
        LoopConfig {
            loop_hz: c.loop_hz,
            safety_cooldown: Duration::from_millis(c.safety_cooldown_ms),
            recovery_pause: Duration::from_millis(c.recovery_pause_ms),
            reconnect_interval: Duration::from_secs(c.reconnect_interval_s),
            status_every: Duration::from_secs(c.status_every_s),
            report_every: Duration::from_secs(c.report_every_s),
            startup_attempts: c.startup_attempts,
            startup_retry_delay: Duration::from_millis(c.startup_retry_delay_ms),
            latency_window: c.latency_window,
            slow_cycle_factor: c.slow_cycle_factor,
        }
    }

    pub fn safety_gate(&self) -> SafetyGate {
        SafetyGate::new(self.safety.battery_critical, self.safety.obstacle_critical)
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::new(self.fallback.obstacle_avoid, self.fallback.battery_low)
    }

    pub fn backend(&self) -> Result<BackendKind, BrainstemError> {
        self.hardware.backend.parse()
    }

    /// Telemetry settings; the environment still wins over the file.
    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            service_name: self.telemetry.service_name.clone(),
            format: LogFormat::parse(&self.telemetry.log_format),
            otlp_endpoint: self.telemetry.otlp_endpoint.clone(),
        }
        .with_env_overrides()
    }

    /// Reject configurations the robot cannot run with.
    ///
    /// # Errors
    ///
    /// [`BrainstemError::InvalidConfig`] describing the first problem found.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), BrainstemError> {
        let invalid = |msg: String| Err(BrainstemError::InvalidConfig(msg));

        self.loop_config().validate()?;
        if self.link.connect_timeout_ms == 0 || self.link.exchange_timeout_ms == 0 {
            return invalid("link timeouts must be greater than zero".into());
        }
        if self.link.endpoint.trim().is_empty() {
            return invalid("link endpoint must not be empty".into());
        }
        if !(self.fallback.obstacle_avoid > self.safety.obstacle_critical) {
            return invalid(format!(
                "fallback.obstacle_avoid ({}) must exceed safety.obstacle_critical ({})",
                self.fallback.obstacle_avoid, self.safety.obstacle_critical
            ));
        }
        if !(self.fallback.battery_low >= self.safety.battery_critical) {
            return invalid(format!(
                "fallback.battery_low ({}) must not be below safety.battery_critical ({})",
                self.fallback.battery_low, self.safety.battery_critical
            ));
        }
        self.backend()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// `BRAINSTEM_CONFIG` if set, else `~/.brainstem/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("BRAINSTEM_CONFIG")
        && !explicit.trim().is_empty()
    {
        return PathBuf::from(explicit);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".brainstem").join("config.toml")
}

/// Load from [`config_path`] (defaults when absent) and apply environment
/// overrides.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the file at `path`.  Returns `None` when it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `BRAINSTEM_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `BRAINSTEM_ENDPOINT` | `link.endpoint` |
/// | `BRAINSTEM_ROBOT_ID` | `link.robot_id` |
/// | `BRAINSTEM_LOOP_HZ` | `control.loop_hz` (ignored unless numeric) |
/// | `BRAINSTEM_BACKEND` | `hardware.backend` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("BRAINSTEM_ENDPOINT") {
        cfg.link.endpoint = v;
    }
    if let Ok(v) = std::env::var("BRAINSTEM_ROBOT_ID") {
        cfg.link.robot_id = v;
    }
    if let Ok(v) = std::env::var("BRAINSTEM_LOOP_HZ")
        && let Ok(hz) = v.trim().parse::<f64>()
    {
        cfg.control.loop_hz = hz;
    }
    if let Ok(v) = std::env::var("BRAINSTEM_BACKEND") {
        cfg.hardware.backend = v;
    }
}

/// The default configuration as TOML, for `--print-config`.
pub fn default_toml() -> Result<String, String> {
    toml::to_string_pretty(&Config::default())
        .map_err(|e| format!("Failed to serialize config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Held by every test that sets or reads `BRAINSTEM_*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn defaults_match_component_defaults() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.link_config(), LinkConfig::default());
        assert_eq!(cfg.loop_config(), LoopConfig::default());
        assert_eq!(cfg.safety_gate(), SafetyGate::default());
        assert_eq!(cfg.fallback_policy(), FallbackPolicy::default());
        assert_eq!(cfg.backend().unwrap(), BackendKind::Simulator);
    }

    #[test]
    fn default_template_parses_back() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, &default_toml().expect("serialize"));
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            &dir,
            r#"
[link]
endpoint = "ws://brain.local:9977"

[control]
loop_hz = 20.0
"#,
        );
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.link.endpoint, "ws://brain.local:9977");
        assert_eq!(cfg.link.robot_id, DEFAULT_ROBOT_ID);
        assert_eq!(cfg.loop_config().period(), Duration::from_millis(50));
        assert_eq!(cfg.safety, SafetySection::default());
    }

    #[test]
    fn replay_backend_from_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "[hardware]\nbackend = \"replay:/var/run/robot.json\"\n");
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(
            cfg.backend().unwrap(),
            BackendKind::Replay {
                path: PathBuf::from("/var/run/robot.json")
            }
        );
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "[control]\nloop_hz = \"fast\"\n");
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse"));
    }

    #[test]
    fn config_path_points_to_brainstem_dir() {
        let p = config_path_for_home("/home/robot");
        assert_eq!(p, PathBuf::from("/home/robot/.brainstem/config.toml"));
    }

    #[test]
    fn rejects_avoidance_inside_critical_zone() {
        let mut cfg = Config::default();
        cfg.fallback.obstacle_avoid = 8.0;
        assert!(matches!(
            cfg.validate(),
            Err(BrainstemError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_low_battery_below_critical() {
        let mut cfg = Config::default();
        cfg.fallback.battery_low = 10.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeouts_and_rate() {
        let mut cfg = Config::default();
        cfg.link.exchange_timeout_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.control.loop_hz = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut cfg = Config::default();
        cfg.hardware.backend = "picar-physical".into();
        assert!(matches!(
            cfg.validate(),
            Err(BrainstemError::InvalidConfig(_))
        ));
    }

    #[test]
    fn env_overrides_endpoint() {
        let _env = env_lock();
        // SAFETY: ENV_LOCK serialises every test in this crate that touches the environment.
        unsafe { std::env::set_var("BRAINSTEM_ENDPOINT", "ws://10.0.0.7:9977") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.link.endpoint, "ws://10.0.0.7:9977");
        unsafe { std::env::remove_var("BRAINSTEM_ENDPOINT") };
    }

    #[test]
    fn env_overrides_robot_id() {
        let _env = env_lock();
        // SAFETY: ENV_LOCK serialises every test in this crate that touches the environment.
        unsafe { std::env::set_var("BRAINSTEM_ROBOT_ID", "picar_02") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.link.robot_id, "picar_02");
        unsafe { std::env::remove_var("BRAINSTEM_ROBOT_ID") };
    }

    #[test]
    fn env_loop_hz_ignores_garbage() {
        let _env = env_lock();
        // SAFETY: ENV_LOCK serialises every test in this crate that touches the environment.
        unsafe { std::env::set_var("BRAINSTEM_LOOP_HZ", "very fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.loop_hz, 10.0);

        unsafe { std::env::set_var("BRAINSTEM_LOOP_HZ", "25") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.loop_hz, 25.0);
        unsafe { std::env::remove_var("BRAINSTEM_LOOP_HZ") };
    }

    #[test]
    fn env_overrides_backend() {
        let _env = env_lock();
        // SAFETY: ENV_LOCK serialises every test in this crate that touches the environment.
        unsafe { std::env::set_var("BRAINSTEM_BACKEND", "replay:/tmp/drive.json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(matches!(cfg.backend(), Ok(BackendKind::Replay { .. })));
        unsafe { std::env::remove_var("BRAINSTEM_BACKEND") };
    }

    #[test]
    fn env_override_leaves_other_fields_at_defaults() {
        let _env = env_lock();
        // SAFETY: ENV_LOCK serialises every test in this crate that touches the environment.
        unsafe { std::env::set_var("BRAINSTEM_ROBOT_ID", "picar_03") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("BRAINSTEM_ROBOT_ID") };

        let defaults = Config::default();
        assert_eq!(cfg.link.robot_id, "picar_03");
        assert_eq!(cfg.link.endpoint, defaults.link.endpoint);
        assert_eq!(cfg.control.loop_hz, defaults.control.loop_hz);
        assert_eq!(cfg.hardware.backend, defaults.hardware.backend);
    }

    #[test]
    fn env_loop_hz_out_of_range_fails_validation() {
        let _env = env_lock();
        // SAFETY: ENV_LOCK serialises every test in this crate that touches the environment.
        unsafe { std::env::set_var("BRAINSTEM_LOOP_HZ", "1e-30") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("BRAINSTEM_LOOP_HZ") };

        assert!(matches!(
            cfg.validate(),
            Err(BrainstemError::InvalidConfig(_))
        ));
    }
}

//! `brainstem` – runs the robot's control core.
//!
//! 1. Loads `~/.brainstem/config.toml` (or `BRAINSTEM_CONFIG`) plus
//!    `BRAINSTEM_*` environment overrides, and validates it.
//! 2. Installs logging / trace export.
//! 3. Selects and initialises the hardware backend.
//! 4. Runs the control loop until **Ctrl-C**, then stops the robot and
//!    closes the decision-service session.
//!
//! `brainstem --print-config` prints the default configuration and exits.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brainstem_hal::select_backend;
use brainstem_link::DecisionLink;
use brainstem_runtime::{ControlLoop, init_tracing};
use colored::Colorize;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    if std::env::args().skip(1).any(|a| a == "--print-config") {
        return match config::default_toml() {
            Ok(toml) => {
                print!("{toml}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Config error".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // Held until exit so pending spans are flushed.
    let _telemetry = init_tracing(&cfg.telemetry_settings());

    print_banner(&cfg);

    if let Err(e) = cfg.validate() {
        error!(error = %e, path = %config::config_path().display(), "refusing to start");
        return ExitCode::FAILURE;
    }

    match run(&cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "brainstem aborted");
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &config::Config) -> Result<(), String> {
    let backend = cfg.backend().map_err(|e| e.to_string())?;
    let hardware = select_backend(&backend).map_err(|e| e.to_string())?;
    let link = DecisionLink::new(cfg.link_config());

    let mut control = ControlLoop::new(
        cfg.loop_config(),
        hardware,
        link,
        cfg.safety_gate(),
        cfg.fallback_policy(),
    )
    .map_err(|e| e.to_string())?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; the loop can only be killed");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;

    runtime.block_on(control.run(shutdown));

    let perf = control.performance();
    info!(
        cycles = perf.total_cycles,
        communication_errors = perf.communication_errors,
        "brainstem stopped"
    );
    Ok(())
}

fn print_banner(cfg: &config::Config) {
    println!();
    println!("{}", "  ┌─┐┬─┐┌─┐┬┌┐┌┌─┐┌┬┐┌─┐┌┬┐".bold().cyan());
    println!("{}", "  ├┴┐├┬┘├─┤││││└─┐ │ ├┤ │││".bold().cyan());
    println!("{}", "  └─┘┴└─┴ ┴┴┘└┘└─┘ ┴ └─┘┴ ┴".bold().cyan());
    println!(
        "  {} {}",
        "brainstem".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  decision service  {}", cfg.link.endpoint.bold());
    println!("  hardware          {}", cfg.hardware.backend.bold());
    println!("  loop              {} Hz", cfg.control.loop_hz);
    println!();
}

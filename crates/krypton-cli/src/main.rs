//! `krypton-cli` – Krypton simulation shell
//!
//! This binary drives the motion-control core against simulated hardware.
//! It:
//!
//! 1. Checks for `~/.krypton/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Builds a simulated robot (drivetrain, turret, hood, camera) from the
//!    configuration.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/drive`, `/curve`, `/turret`, `/tape`, `/fault`, `/help`, …).
//! 4. Intercepts **Ctrl-C**: a running command is cancelled (its actuators
//!    stop through `end(interrupted)`); at the prompt it exits safely.

mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::warn;

use krypton_runtime::config::{self, RobotConfig};
use krypton_runtime::{Robot, init_tracing};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG (default "info"), KRYPTON_LOG_FORMAT=json, and
    // OTEL_EXPORTER_OTLP_ENDPOINT for span export.  The guard flushes spans
    // when main returns.
    let _telemetry = init_tracing("krypton-cli");

    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let signals = Arc::new(repl::Signals::default());
    let handler_signals = Arc::clone(&signals);

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        if handler_signals.busy.load(Ordering::SeqCst) {
            println!("{}", "⚠  Ctrl-C received – cancelling the running command …".yellow().bold());
            handler_signals.interrupt.store(true, Ordering::SeqCst);
        } else {
            println!("{}", "⚠  Ctrl-C received – press Enter to exit Krypton.".yellow().bold());
            handler_signals.shutdown.store(true, Ordering::SeqCst);
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; running commands cannot be cancelled with Ctrl-C");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            RobotConfig::default()
        }
    };

    let mut robot = match Robot::simulated(cfg) {
        Ok(robot) => robot.with_realtime(true),
        Err(e) => {
            println!("{}: {}", "Cannot build robot".red(), e);
            return;
        }
    };

    let cfg = robot.config();
    let drivetrain = if cfg.sim.mecanum { "mecanum" } else { "tank" };
    println!(
        "  Simulated robot: {} drive, {} control, {} ms period",
        drivetrain.bold(),
        cfg.drive.mode.to_string().bold(),
        cfg.control_period_ms
    );
    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&mut robot, &signals);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> RobotConfig {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Krypton First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the simulator.\n");

    let mut cfg = RobotConfig::default();

    println!("  Which drivetrain should be simulated?");
    println!("    1) Tank (two tracks)  (default)");
    println!("    2) Mecanum (four wheels)");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.sim.mecanum = choice.trim() == "2";

    let period = prompt_line(
        &format!("  Control period in ms [{}]: ", cfg.control_period_ms),
        &cfg.control_period_ms.to_string(),
    );
    match period.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => cfg.control_period_ms = ms,
        _ => println!(
            "  {} '{}' is not a valid period, keeping {}",
            "Warning:".yellow(),
            period,
            cfg.control_period_ms
        ),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    __ __                 __            "#.bold().cyan());
    println!("{}", r#"   / //_/_______  ______  / /_____  ____ "#.bold().cyan());
    println!("{}", r#"  / ,<  / ___/ / / / __ \/ __/ __ \/ __ \"#.bold().cyan());
    println!("{}", r#" / /| |/ /  / /_/ / /_/ / /_/ /_/ / / / /"#.bold().cyan());
    println!("{}", r#"/_/ |_/_/   \__, / .___/\__/\____/_/ /_/ "#.bold().cyan());
    println!("{}", r#"           /____/_/                      "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Krypton".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Motion-control simulation shell");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

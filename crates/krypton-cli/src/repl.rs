//! REPL – Read-Eval-Print Loop for the Krypton simulation shell.
//!
//! Supported slash-commands:
//!   /drive <in>                    – drive straight
//!   /curve <deg> <radius-in>       – turn about a point
//!   /hold <in>                     – move using position commands
//!   /turret | /hood                – vision aiming (turret runs until Ctrl-C)
//!   /trim <turret|hood> <deg>      – shift the aim trim
//!   /tape                          – drive onto the floor tape
//!   /set <key> <value>             – write a tunable
//!   /target <bearing> <elev> [in]  – place the vision target
//!   /notarget                      – remove the vision target
//!   /fault <actuator> [bus]        – inject an encoder (or bus) fault
//!   /heal <actuator>               – clear injected faults
//!   /status                        – actuator and loop status
//!   /help                          – show this list
//!   /quit | /exit                  – stop everything and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use krypton_control::AimAxis;
use krypton_control::commands::{TAPE_ANGLE_KEY, TAPE_DISTANCE_KEY, TAPE_STRAFE_KEY};
use krypton_hal::sim::SimTarget;
use krypton_runtime::{Robot, RunOutcome};
use krypton_types::{ControlError, MotionRequest};

/// Flags shared with the Ctrl-C handler.
#[derive(Default)]
pub struct Signals {
    /// A motion is running; Ctrl-C cancels it instead of exiting.
    pub busy: AtomicBool,
    /// Raised by Ctrl-C while busy.
    pub interrupt: AtomicBool,
    /// Raised by Ctrl-C at the prompt.
    pub shutdown: AtomicBool,
}

/// Kind of fault injected by `/fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Encoder freezes and reports untrusted.
    Encoder,
    /// Driver rejects every command.
    Bus,
}

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Drive { inches: f64 },
    Curve { degrees: f64, radius_inches: f64 },
    Hold { inches: f64 },
    Aim(AimAxis),
    Trim { axis: AimAxis, delta: f64 },
    Tape,
    Set { key: String, value: f64 },
    Target(SimTarget),
    NoTarget,
    Fault { actuator: String, kind: FaultKind },
    Heal { actuator: String },
    Status,
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse one input line.  Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// A message for the operator when the command or its arguments are
    /// not recognised.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let cmd = match head {
            "/drive" => {
                let [inches] = numbers::<1>(head, &args)?;
                Self::Drive { inches }
            }
            "/curve" => {
                let [degrees, radius_inches] = numbers::<2>(head, &args)?;
                Self::Curve {
                    degrees,
                    radius_inches,
                }
            }
            "/hold" => {
                let [inches] = numbers::<1>(head, &args)?;
                Self::Hold { inches }
            }
            "/turret" => no_args(head, &args, Self::Aim(AimAxis::Yaw))?,
            "/hood" => no_args(head, &args, Self::Aim(AimAxis::Elevation))?,
            "/trim" => match args.as_slice() {
                [axis, delta] => Self::Trim {
                    axis: parse_axis(axis)?,
                    delta: number(delta)?,
                },
                _ => return Err(usage(head, "<turret|hood> <degrees>")),
            },
            "/tape" => no_args(head, &args, Self::Tape)?,
            "/set" => match args.as_slice() {
                [key, value] => Self::Set {
                    key: resolve_key(key),
                    value: number(value)?,
                },
                _ => return Err(usage(head, "<key> <value>")),
            },
            "/target" => match args.as_slice() {
                [bearing, elevation] => Self::Target(SimTarget {
                    bearing: number(bearing)?,
                    elevation: number(elevation)?,
                    distance: None,
                }),
                [bearing, elevation, distance] => Self::Target(SimTarget {
                    bearing: number(bearing)?,
                    elevation: number(elevation)?,
                    distance: Some(number(distance)?),
                }),
                _ => return Err(usage(head, "<bearing> <elevation> [distance]")),
            },
            "/notarget" => no_args(head, &args, Self::NoTarget)?,
            "/fault" => match args.as_slice() {
                [actuator] => Self::Fault {
                    actuator: actuator.to_string(),
                    kind: FaultKind::Encoder,
                },
                [actuator, "encoder"] => Self::Fault {
                    actuator: actuator.to_string(),
                    kind: FaultKind::Encoder,
                },
                [actuator, "bus"] => Self::Fault {
                    actuator: actuator.to_string(),
                    kind: FaultKind::Bus,
                },
                _ => return Err(usage(head, "<actuator> [encoder|bus]")),
            },
            "/heal" => match args.as_slice() {
                [actuator] => Self::Heal {
                    actuator: actuator.to_string(),
                },
                _ => return Err(usage(head, "<actuator>")),
            },
            "/status" => Self::Status,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            other => return Err(format!("Unknown command '{other}'")),
        };
        Ok(Some(cmd))
    }
}

fn usage(cmd: &str, args: &str) -> String {
    format!("Usage: {cmd} {args}")
}

fn number(raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("'{raw}' is not a number")),
    }
}

fn numbers<const N: usize>(cmd: &str, args: &[&str]) -> Result<[f64; N], String> {
    if args.len() != N {
        let expected = match N {
            1 => "<value>",
            _ => "<value> <value>",
        };
        return Err(usage(cmd, expected));
    }
    let mut out = [0.0; N];
    for (slot, raw) in out.iter_mut().zip(args) {
        *slot = number(raw)?;
    }
    Ok(out)
}

fn no_args(cmd: &str, args: &[&str], parsed: ShellCommand) -> Result<ShellCommand, String> {
    if args.is_empty() {
        Ok(parsed)
    } else {
        Err(format!("{cmd} takes no arguments"))
    }
}

fn parse_axis(raw: &str) -> Result<AimAxis, String> {
    match raw {
        "turret" | "yaw" => Ok(AimAxis::Yaw),
        "hood" | "elevation" => Ok(AimAxis::Elevation),
        other => Err(format!("Unknown axis '{other}' (turret or hood)")),
    }
}

/// Short names for the tape offsets published by the co-processor.
fn resolve_key(raw: &str) -> String {
    match raw {
        "strafe" => TAPE_STRAFE_KEY.to_string(),
        "distance" => TAPE_DISTANCE_KEY.to_string(),
        "angle" => TAPE_ANGLE_KEY.to_string(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for the interactive REPL.
///
/// `signals.shutdown` is polled each iteration; when set the REPL exits
/// cleanly.
pub fn run(robot: &mut Robot, signals: &Signals) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if signals.shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "krypton>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = match ShellCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                println!(
                    "{} Type {} for available commands.",
                    msg.red(),
                    "/help".bold()
                );
                continue;
            }
        };

        if cmd == ShellCommand::Quit {
            println!("{}", "Goodbye.".green());
            break;
        }
        dispatch(robot, signals, cmd);
    }

    if let Err(e) = robot.shutdown() {
        println!("{}: {}", "Shutdown error".red(), e);
    }
}

fn dispatch(robot: &mut Robot, signals: &Signals, cmd: ShellCommand) {
    match cmd {
        ShellCommand::Drive { inches } => {
            let started = robot.drive(MotionRequest::RelativeDistance { inches });
            run_motion(robot, signals, started);
        }
        ShellCommand::Curve {
            degrees,
            radius_inches,
        } => {
            let started = robot.drive(MotionRequest::RelativeRotation {
                degrees,
                radius_inches,
            });
            run_motion(robot, signals, started);
        }
        ShellCommand::Hold { inches } => {
            let started = robot.hold(inches);
            run_motion(robot, signals, started);
        }
        ShellCommand::Aim(axis) => {
            if axis == AimAxis::Yaw {
                println!("  {}", "Tracking until Ctrl-C …".dimmed());
            }
            let started = robot.aim(axis);
            run_motion(robot, signals, started);
        }
        ShellCommand::Trim { axis, delta } => match robot.trim(axis, delta) {
            Ok(trim) => println!("{} {:?} trim {:+.2}°", "✓".green(), axis, trim),
            Err(e) => println!("{}: {}", "Error".red(), e),
        },
        ShellCommand::Tape => {
            let started = robot.tape();
            run_motion(robot, signals, started);
        }
        ShellCommand::Set { key, value } => {
            robot.tunables().set(&key, value);
            println!("{} {} = {}", "✓".green(), key.bold(), value);
        }
        ShellCommand::Target(target) => match robot.probes().vision() {
            Some(vision) => {
                vision.set_target(Some(target));
                println!("{} target placed", "✓".green());
            }
            None => println!("{}", "No camera fitted.".yellow()),
        },
        ShellCommand::NoTarget => {
            if let Some(vision) = robot.probes().vision() {
                vision.set_target(None);
            }
            println!("{} target removed", "✓".green());
        }
        ShellCommand::Fault { actuator, kind } => match robot.probes().actuator(&actuator) {
            Some(probe) => {
                match kind {
                    FaultKind::Encoder => probe.set_encoder_fault(true),
                    FaultKind::Bus => probe.set_reject_commands(true),
                }
                println!("{} {:?} fault on {}", "⚠".yellow(), kind, actuator.bold());
            }
            None => println!("{} '{}'", "Unknown actuator:".red(), actuator.yellow()),
        },
        ShellCommand::Heal { actuator } => match robot.probes().actuator(&actuator) {
            Some(probe) => {
                probe.set_encoder_fault(false);
                probe.set_reject_commands(false);
                println!("{} {} healed", "✓".green(), actuator.bold());
            }
            None => println!("{} '{}'", "Unknown actuator:".red(), actuator.yellow()),
        },
        ShellCommand::Status => cmd_status(robot),
        ShellCommand::Help => cmd_help(),
        ShellCommand::Quit => {}
    }
}

/// Run the control loop until the started command ends or Ctrl-C.
fn run_motion(robot: &mut Robot, signals: &Signals, started: Result<impl std::fmt::Display, ControlError>) {
    let handle = match started {
        Ok(handle) => handle,
        Err(e) => {
            println!("{}: {}", "Rejected".red(), e);
            return;
        }
    };
    println!("  {} {}", "▶ running".cyan(), handle.to_string().dimmed());

    signals.interrupt.store(false, Ordering::SeqCst);
    signals.busy.store(true, Ordering::SeqCst);
    let outcome = robot.run(&signals.interrupt, None);
    signals.busy.store(false, Ordering::SeqCst);
    signals.interrupt.store(false, Ordering::SeqCst);

    match outcome {
        RunOutcome::Idle => println!("  {}", "✓ done".green()),
        RunOutcome::Interrupted => println!("  {}", "■ cancelled".yellow()),
        RunOutcome::CycleLimit => println!("  {}", "… still running".yellow()),
    }
    cmd_status(robot);
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Krypton Commands".bold().underline());
    println!("  {}           – drive straight", "/drive <in>".bold().cyan());
    println!("  {}  – turn about a point", "/curve <deg> <radius>".bold().cyan());
    println!("  {}            – move using position commands", "/hold <in>".bold().cyan());
    println!("  {}       – vision aiming (Ctrl-C stops)", "/turret  /hood".bold().cyan());
    println!("  {}    – shift the aim trim", "/trim <axis> <deg>".bold().cyan());
    println!("  {}                – drive onto the floor tape", "/tape".bold().cyan());
    println!("  {}     – write a tunable (strafe/distance/angle)", "/set <key> <value>".bold().cyan());
    println!("  {}  – place the vision target", "/target <b> <e> [d]".bold().cyan());
    println!("  {}            – remove the vision target", "/notarget".bold().cyan());
    println!("  {}    – inject an encoder or bus fault", "/fault <id> [bus]".bold().cyan());
    println!("  {}           – clear injected faults", "/heal <id>".bold().cyan());
    println!("  {}              – actuator and loop status", "/status".bold().cyan());
    println!("  {}        – exit the shell", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(robot: &Robot) {
    let status = robot.status();
    println!("{}", "Status".bold().underline());
    for a in &status.actuators {
        let encoder = if a.encoder_trusted {
            "ok".green()
        } else {
            "UNTRUSTED".red()
        };
        println!(
            "  {:<18} pos {:>8}  vel {:>9.1}  encoder {}",
            a.id.bold(),
            a.position,
            a.velocity,
            encoder
        );
    }
    let running = if status.running.is_empty() {
        "none".dimmed().to_string()
    } else {
        status.running.join(", ")
    };
    println!("  running   : {running}");
    println!(
        "  on target : {}",
        if status.on_target { "yes".green() } else { "no".dimmed() }
    );
    println!(
        "  cycles    : {} ({} overruns, worst {:?})",
        status.cycles, status.overruns, status.worst_cycle
    );
    let tunables = robot.tunables().snapshot();
    if !tunables.is_empty() {
        println!("  tunables  :");
        for (k, v) in tunables {
            println!("    {k} = {v}");
        }
    }
}

//! `krypton-kernel` – command scheduling and cycle supervision.
//!
//! The kernel does not move anything itself; it decides *which* commands run
//! each control cycle and makes sure two commands never drive the same
//! subsystem at once.
//!
//! # Modules
//!
//! - [`command`] – the [`Command`][command::Command] lifecycle trait
//!   (`initialize` → `execute`* → `is_finished` → `end`).
//! - [`requirements`] – [`RequirementManager`][requirements::RequirementManager]:
//!   exclusive ownership of named subsystems ("drivetrain", "turret", …).
//!   A second claim on a held subsystem fails with
//!   [`ControlError::ResourceConflict`][krypton_types::ControlError::ResourceConflict].
//! - [`scheduler`] – [`CommandScheduler`][scheduler::CommandScheduler]:
//!   runs every scheduled command once per cycle and retires the finished
//!   ones.  It is a flat scheduler, not a command-group sequencer.
//! - [`watchdog`] – [`CycleWatchdog`][watchdog::CycleWatchdog]:
//!   measures each control cycle against its period and reports overruns.

pub mod command;
pub mod requirements;
pub mod scheduler;
pub mod watchdog;

pub use command::Command;
pub use requirements::RequirementManager;
pub use scheduler::{CommandHandle, CommandScheduler};
pub use watchdog::{CycleHealth, CycleWatchdog};

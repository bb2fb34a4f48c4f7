//! [`CommandScheduler`] – runs scheduled commands once per control cycle.
//!
//! ```text
//! schedule ─► claim requirements ─► initialize ─┐
//!                                               ▼
//!            ┌──────────── run_cycle ◄──────────┘
//!            │  execute ─► is_finished? ─yes─► end(false) ─► release
//!            │     │
//!            │     └─ error ─────────────────► end(true)  ─► release
//!            └─ cancel / cancel_all ─────────► end(true)  ─► release
//! ```
//!
//! Commands run in the order they were scheduled.  `end` is called exactly
//! once for every command that was handed to [`CommandScheduler::schedule`],
//! including ones whose `initialize` failed.

use std::fmt;

use krypton_types::ControlError;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::requirements::RequirementManager;

/// Opaque identifier of a scheduled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle(u64);

impl fmt::Display for CommandHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Scheduled {
    handle: CommandHandle,
    holder: String,
    command: Box<dyn Command>,
}

/// Flat command scheduler with exclusive subsystem requirements.
///
/// # Example
///
/// ```
/// use krypton_kernel::{Command, CommandScheduler};
/// use krypton_types::ControlError;
///
/// struct Countdown { left: u32, requires: Vec<String> }
///
/// impl Command for Countdown {
///     fn name(&self) -> &str { "countdown" }
///     fn requirements(&self) -> &[String] { &self.requires }
///     fn initialize(&mut self) -> Result<(), ControlError> { Ok(()) }
///     fn execute(&mut self) -> Result<(), ControlError> { self.left -= 1; Ok(()) }
///     fn is_finished(&self) -> bool { self.left == 0 }
///     fn end(&mut self, _interrupted: bool) {}
/// }
///
/// let mut scheduler = CommandScheduler::new();
/// let handle = scheduler
///     .schedule(Box::new(Countdown { left: 2, requires: vec!["hood".into()] }))
///     .unwrap();
///
/// scheduler.run_cycle();
/// assert!(scheduler.is_scheduled(handle));
/// scheduler.run_cycle();
/// assert!(!scheduler.is_scheduled(handle));
/// ```
#[derive(Default)]
pub struct CommandScheduler {
    requirements: RequirementManager,
    scheduled: Vec<Scheduled>,
    next_id: u64,
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the command's requirements and initialize it.
    ///
    /// # Errors
    ///
    /// - [`ControlError::ResourceConflict`] when a required subsystem is held
    ///   by another scheduled command.  The new command is dropped without
    ///   being initialized.
    /// - Any error from [`Command::initialize`].  The command's `end(true)` is
    ///   called and its requirements are released.
    pub fn schedule(&mut self, mut command: Box<dyn Command>) -> Result<CommandHandle, ControlError> {
        let handle = CommandHandle(self.next_id);
        self.next_id += 1;
        let holder = format!("{}{handle}", command.name());

        self.requirements.claim(&holder, command.requirements())?;

        if let Err(e) = command.initialize() {
            warn!(command = %holder, error = %e, "initialize failed");
            command.end(true);
            self.requirements.release(&holder);
            return Err(e);
        }

        info!(command = %holder, "scheduled");
        self.scheduled.push(Scheduled {
            handle,
            holder,
            command,
        });
        Ok(handle)
    }

    /// Run every scheduled command for one cycle and retire the finished
    /// ones.  Returns the handles of commands that ended this cycle.
    pub fn run_cycle(&mut self) -> Vec<CommandHandle> {
        let mut ended = Vec::new();
        let mut i = 0;
        while i < self.scheduled.len() {
            let entry = &mut self.scheduled[i];
            let interrupted = match entry.command.execute() {
                Ok(()) if entry.command.is_finished() => Some(false),
                Ok(()) => None,
                Err(e) => {
                    warn!(command = %entry.holder, error = %e, "execute failed; cancelling");
                    Some(true)
                }
            };
            match interrupted {
                Some(interrupted) => {
                    let mut entry = self.scheduled.remove(i);
                    entry.command.end(interrupted);
                    self.requirements.release(&entry.holder);
                    debug!(command = %entry.holder, interrupted, "ended");
                    ended.push(entry.handle);
                }
                None => i += 1,
            }
        }
        ended
    }

    /// Cancel one command.  Returns `false` if it is not scheduled.
    pub fn cancel(&mut self, handle: CommandHandle) -> bool {
        let Some(pos) = self.scheduled.iter().position(|s| s.handle == handle) else {
            return false;
        };
        let mut entry = self.scheduled.remove(pos);
        entry.command.end(true);
        self.requirements.release(&entry.holder);
        info!(command = %entry.holder, "cancelled");
        true
    }

    /// Cancel every scheduled command (robot disabled).
    pub fn cancel_all(&mut self) {
        for mut entry in self.scheduled.drain(..) {
            entry.command.end(true);
            self.requirements.release(&entry.holder);
            info!(command = %entry.holder, "cancelled");
        }
    }

    pub fn is_scheduled(&self, handle: CommandHandle) -> bool {
        self.scheduled.iter().any(|s| s.handle == handle)
    }

    /// Names of running commands, in scheduling order.
    pub fn scheduled_names(&self) -> Vec<String> {
        self.scheduled
            .iter()
            .map(|s| s.command.name().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    /// Current holder of `resource`, if any.
    pub fn holder(&self, resource: &str) -> Option<&str> {
        self.requirements.holder(resource)
    }
}

impl Drop for CommandScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

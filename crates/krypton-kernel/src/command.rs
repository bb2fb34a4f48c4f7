//! The [`Command`] lifecycle.
//!
//! A scheduler calls [`initialize`][Command::initialize] once, then
//! [`execute`][Command::execute] every control cycle followed by
//! [`is_finished`][Command::is_finished].  When the command finishes, or is
//! cancelled, [`end`][Command::end] is called exactly once.

use krypton_types::ControlError;

/// A unit of robot behaviour driven by a scheduler.
pub trait Command: Send {
    /// Human-readable name used in logs and conflict reports.
    fn name(&self) -> &str;

    /// Subsystems this command needs exclusive use of while it runs.
    fn requirements(&self) -> &[String];

    /// Prepare to run.  Called once before the first `execute`.
    ///
    /// # Errors
    ///
    /// Any error prevents the command from being scheduled; the scheduler
    /// still calls `end(true)` so partial setup is undone.
    fn initialize(&mut self) -> Result<(), ControlError>;

    /// Run one control cycle.
    ///
    /// # Errors
    ///
    /// An error makes the scheduler cancel the command.
    fn execute(&mut self) -> Result<(), ControlError>;

    fn is_finished(&self) -> bool;

    /// Clean up.  `interrupted` is `true` when the command was cancelled
    /// rather than finishing on its own.
    fn end(&mut self, interrupted: bool);
}

impl<C: Command + ?Sized> Command for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn requirements(&self) -> &[String] {
        (**self).requirements()
    }

    fn initialize(&mut self) -> Result<(), ControlError> {
        (**self).initialize()
    }

    fn execute(&mut self) -> Result<(), ControlError> {
        (**self).execute()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn end(&mut self, interrupted: bool) {
        (**self).end(interrupted)
    }
}

//! `krypton-hal` – hardware abstraction consumed by the motion-control core.
//!
//! # Modules
//!
//! - [`actuator`] – per-driver [`Actuator`][actuator::Actuator] trait and the
//!   id-routed [`ActuatorInterface`][actuator::ActuatorInterface] that
//!   controllers talk to.
//! - [`vision`] – [`VisionInterface`][vision::VisionInterface]: a pure data
//!   source for aiming offsets plus the pipeline selector.
//! - [`indicator`] – on/off status lights (e.g. the on-target light).
//! - [`tunables`] – named numeric values with defaults, read fresh each cycle.
//! - [`pid`] – [`PidController`][pid::PidController], the closed-loop layer
//!   under position holds and aiming.
//! - [`registry`] – [`HardwareRegistry`][registry::HardwareRegistry]: the
//!   single composition root that owns every driver.
//! - [`sim`] – in-process simulated drivers for tests and the CLI.
//!
//! Every interface trait is also implemented for `Arc<Mutex<T>>`, so one
//! registry can be shared between the controllers that the scheduler runs.

use std::sync::{Mutex, MutexGuard};

use krypton_types::ControlError;

pub mod actuator;
pub mod indicator;
pub mod pid;
pub mod registry;
pub mod sim;
pub mod tunables;
pub mod vision;

pub use actuator::{Actuator, ActuatorInterface};
pub use indicator::{IndicatorInterface, StatusIndicator};
pub use pid::PidController;
pub use registry::HardwareRegistry;
pub use tunables::{SharedTunables, Tunables};
pub use vision::VisionInterface;

/// Lock a shared hardware handle, mapping poisoning to a hardware fault.
pub(crate) fn lock_handle<'a, T: ?Sized>(
    shared: &'a Mutex<T>,
    component: &str,
) -> Result<MutexGuard<'a, T>, ControlError> {
    shared
        .lock()
        .map_err(|_| ControlError::hardware(component, "hardware handle lock poisoned"))
}

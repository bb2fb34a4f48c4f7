//! On/off status lights, e.g. the LED strip that shows the turret is on
//! target.

use std::sync::{Arc, Mutex};

use krypton_types::ControlError;

use crate::lock_handle;

/// A discrete on/off indicator.
///
/// Drivers implement this trait and register themselves with a
/// [`HardwareRegistry`][crate::registry::HardwareRegistry].
pub trait StatusIndicator: Send {
    /// Stable identifier, e.g. `"on_target"`.
    fn id(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`ControlError::HardwareFault`] if the command cannot be applied.
    fn set_state(&mut self, on: bool) -> Result<(), ControlError>;

    fn state(&self) -> bool;
}

/// Id-routed indicator access used by the control core.
pub trait IndicatorInterface: Send {
    /// # Errors
    ///
    /// Returns [`ControlError::HardwareFault`] when `id` is not registered.
    fn set_indicator(&mut self, id: &str, on: bool) -> Result<(), ControlError>;

    /// Unknown indicators read as off.
    fn indicator(&self, id: &str) -> bool;
}

impl<T: IndicatorInterface + ?Sized> IndicatorInterface for Arc<Mutex<T>> {
    fn set_indicator(&mut self, id: &str, on: bool) -> Result<(), ControlError> {
        lock_handle(&**self, id)?.set_indicator(id, on)
    }

    fn indicator(&self, id: &str) -> bool {
        lock_handle(&**self, id)
            .map(|hw| hw.indicator(id))
            .unwrap_or(false)
    }
}

//! Actuator traits for drive and aim motors.
//!
//! Drivers implement [`Actuator`] and register themselves with a
//! [`HardwareRegistry`][crate::registry::HardwareRegistry].  Controllers only
//! ever talk to [`ActuatorInterface`], which addresses actuators by id, so
//! drivers can be swapped (real CAN motor controllers, the simulator, test
//! doubles) without touching control logic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use krypton_types::{ActuatorCommand, ActuatorState, ControlError};

use crate::lock_handle;

/// A single motor with an encoder.
pub trait Actuator: Send {
    /// Stable identifier for this actuator, e.g. `"drive_left"` or `"hood"`.
    fn id(&self) -> &str;

    /// Most recent encoder position in ticks.
    fn position(&self) -> i64;

    /// Most recent encoder velocity in ticks per second.
    fn velocity(&self) -> f64;

    /// `false` when the encoder is disconnected or its readings are stale.
    fn is_encoder_trusted(&self) -> bool;

    /// Drive with a raw voltage fraction in `[-1, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::HardwareFault`] if the command cannot be applied.
    fn set_percent_output(&mut self, output: f64) -> Result<(), ControlError>;

    /// Track a velocity setpoint in ticks per second.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::HardwareFault`] if the command cannot be applied.
    fn set_velocity(&mut self, ticks_per_sec: f64) -> Result<(), ControlError>;

    /// Hold an absolute position setpoint in ticks.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::HardwareFault`] if the command cannot be applied.
    fn set_position(&mut self, ticks: i64) -> Result<(), ControlError>;

    /// Zero the output.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::HardwareFault`] if the command cannot be applied.
    fn stop(&mut self) -> Result<(), ControlError>;

    /// The last setpoint this driver accepted, if it tracks one.
    fn last_command(&self) -> Option<ActuatorCommand> {
        None
    }

    /// Called once per control cycle before any controller runs.  Drivers
    /// that poll their hardware refresh cached readings here.
    fn refresh(&mut self, _dt: Duration) {}
}

/// Id-routed actuator access used by the control core.
pub trait ActuatorInterface: Send {
    /// # Errors
    ///
    /// [`ControlError::HardwareFault`] when `id` is unknown.
    fn position(&self, id: &str) -> Result<i64, ControlError>;

    /// # Errors
    ///
    /// [`ControlError::HardwareFault`] when `id` is unknown.
    fn velocity(&self, id: &str) -> Result<f64, ControlError>;

    /// Unknown actuators report `false`.
    fn is_encoder_trusted(&self, id: &str) -> bool;

    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when `output` is outside `[-1, 1]`,
    /// [`ControlError::HardwareFault`] when the driver rejects it.
    fn set_percent_output(&mut self, id: &str, output: f64) -> Result<(), ControlError>;

    /// # Errors
    ///
    /// [`ControlError::HardwareFault`] when the driver rejects the command.
    fn set_velocity_command(&mut self, id: &str, ticks_per_sec: f64) -> Result<(), ControlError>;

    /// # Errors
    ///
    /// [`ControlError::HardwareFault`] when the driver rejects the command.
    fn set_position_command(&mut self, id: &str, ticks: i64) -> Result<(), ControlError>;

    /// # Errors
    ///
    /// [`ControlError::HardwareFault`] when the driver rejects the command.
    fn stop(&mut self, id: &str) -> Result<(), ControlError>;

    /// Read a full [`ActuatorState`] snapshot.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`position`][Self::position] and
    /// [`velocity`][Self::velocity].
    fn state(&self, id: &str) -> Result<ActuatorState, ControlError> {
        Ok(ActuatorState {
            id: id.to_string(),
            position: self.position(id)?,
            velocity: self.velocity(id)?,
            encoder_trusted: self.is_encoder_trusted(id),
        })
    }
}

impl<T: ActuatorInterface + ?Sized> ActuatorInterface for Arc<Mutex<T>> {
    fn position(&self, id: &str) -> Result<i64, ControlError> {
        lock_handle(&**self, id)?.position(id)
    }

    fn velocity(&self, id: &str) -> Result<f64, ControlError> {
        lock_handle(&**self, id)?.velocity(id)
    }

    fn is_encoder_trusted(&self, id: &str) -> bool {
        // A poisoned handle cannot vouch for its readings.
        lock_handle(&**self, id)
            .map(|hw| hw.is_encoder_trusted(id))
            .unwrap_or(false)
    }

    fn set_percent_output(&mut self, id: &str, output: f64) -> Result<(), ControlError> {
        lock_handle(&**self, id)?.set_percent_output(id, output)
    }

    fn set_velocity_command(&mut self, id: &str, ticks_per_sec: f64) -> Result<(), ControlError> {
        lock_handle(&**self, id)?.set_velocity_command(id, ticks_per_sec)
    }

    fn set_position_command(&mut self, id: &str, ticks: i64) -> Result<(), ControlError> {
        lock_handle(&**self, id)?.set_position_command(id, ticks)
    }

    fn stop(&mut self, id: &str) -> Result<(), ControlError> {
        lock_handle(&**self, id)?.stop(id)
    }

    fn state(&self, id: &str) -> Result<ActuatorState, ControlError> {
        lock_handle(&**self, id)?.state(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal id-routed actuator bank used only for tests.
    #[derive(Default)]
    struct MockBank {
        positions: HashMap<String, i64>,
        untrusted: Vec<String>,
    }

    impl ActuatorInterface for MockBank {
        fn position(&self, id: &str) -> Result<i64, ControlError> {
            self.positions
                .get(id)
                .copied()
                .ok_or_else(|| ControlError::hardware(id, "unknown"))
        }
        fn velocity(&self, _id: &str) -> Result<f64, ControlError> {
            Ok(0.0)
        }
        fn is_encoder_trusted(&self, id: &str) -> bool {
            !self.untrusted.iter().any(|u| u == id)
        }
        fn set_percent_output(&mut self, _id: &str, _output: f64) -> Result<(), ControlError> {
            Ok(())
        }
        fn set_velocity_command(&mut self, _id: &str, _v: f64) -> Result<(), ControlError> {
            Ok(())
        }
        fn set_position_command(&mut self, id: &str, ticks: i64) -> Result<(), ControlError> {
            self.positions.insert(id.to_string(), ticks);
            Ok(())
        }
        fn stop(&mut self, _id: &str) -> Result<(), ControlError> {
            Ok(())
        }
    }

    #[test]
    fn state_snapshot_collects_all_readings() {
        let mut bank = MockBank::default();
        bank.set_position_command("left", 120).unwrap();
        bank.untrusted.push("left".to_string());

        let state = bank.state("left").unwrap();
        assert_eq!(state.id, "left");
        assert_eq!(state.position, 120);
        assert!(!state.encoder_trusted);
    }

    #[test]
    fn shared_handle_routes_through_lock() {
        let shared = Arc::new(Mutex::new(MockBank::default()));
        let mut handle = Arc::clone(&shared);
        handle.set_position_command("turret", -40).unwrap();
        assert_eq!(shared.position("turret").unwrap(), -40);
        assert!(matches!(
            handle.position("missing"),
            Err(ControlError::HardwareFault { .. })
        ));
    }

    #[test]
    fn poisoned_handle_reports_untrusted() {
        let shared = Arc::new(Mutex::new(MockBank::default()));
        let poisoner = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(!shared.is_encoder_trusted("left"));
        assert!(matches!(
            shared.position("left"),
            Err(ControlError::HardwareFault { .. })
        ));
    }
}

//! [`HardwareRegistry`] – the composition root that owns every driver.
//!
//! The registry stores every registered [`Actuator`] and [`StatusIndicator`]
//! by id, plus at most one targeting camera.  Controllers never hold drivers
//! directly; they receive the registry (usually as
//! `Arc<Mutex<HardwareRegistry>>`) through the id-routed
//! [`ActuatorInterface`], [`VisionInterface`] and [`IndicatorInterface`]
//! traits, which is what lets the simulator and real drivers be swapped.
//!
//! Argument validation lives here rather than in each driver: a non-finite
//! setpoint or a percent output outside `[-1, 1]` is rejected with
//! [`ControlError::InvalidArgument`] before any driver sees it.

use std::collections::HashMap;
use std::time::Duration;

use krypton_types::{ActuatorCommand, ControlError, require_finite};
use tracing::{debug, warn};

use crate::actuator::{Actuator, ActuatorInterface};
use crate::indicator::{IndicatorInterface, StatusIndicator};
use crate::vision::VisionInterface;

/// Central hardware driver registry.
///
/// # Example
///
/// ```
/// use krypton_hal::{ActuatorInterface, HardwareRegistry};
/// use krypton_hal::sim::SimActuator;
///
/// let mut registry = HardwareRegistry::new();
/// let (left, _probe) = SimActuator::new("drive_left", 10_000.0);
/// registry.register_actuator(Box::new(left));
///
/// registry.set_velocity_command("drive_left", 2_000.0).unwrap();
/// assert!(registry.set_percent_output("drive_left", 1.5).is_err());
/// assert!(registry.position("drive_right").is_err());
/// ```
#[derive(Default)]
pub struct HardwareRegistry {
    actuators: HashMap<String, Box<dyn Actuator>>,
    indicators: HashMap<String, Box<dyn StatusIndicator>>,
    vision: Option<Box<dyn VisionInterface>>,
}

impl HardwareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actuator driver.  Any previously registered driver with the
    /// same `id` is replaced.
    pub fn register_actuator(&mut self, actuator: Box<dyn Actuator>) {
        let id = actuator.id().to_string();
        if self.actuators.insert(id.clone(), actuator).is_some() {
            debug!(actuator = %id, "replaced actuator driver");
        }
    }

    /// Register an indicator driver, replacing any with the same `id`.
    pub fn register_indicator(&mut self, indicator: Box<dyn StatusIndicator>) {
        self.indicators.insert(indicator.id().to_string(), indicator);
    }

    /// Install the targeting camera, replacing any previous one.
    pub fn register_vision(&mut self, vision: Box<dyn VisionInterface>) {
        self.vision = Some(vision);
    }

    pub fn actuator(&self, id: &str) -> Option<&dyn Actuator> {
        self.actuators.get(id).map(|a| a.as_ref())
    }

    /// Registered actuator ids in sorted order.
    pub fn actuator_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.actuators.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    /// The last command the given actuator accepted, if it tracks one.
    pub fn last_command(&self, id: &str) -> Option<ActuatorCommand> {
        self.actuators.get(id).and_then(|a| a.last_command())
    }

    /// Let every driver refresh its cached readings for the new cycle.
    pub fn refresh(&mut self, dt: Duration) {
        for actuator in self.actuators.values_mut() {
            actuator.refresh(dt);
        }
    }

    /// Stop every actuator and switch every indicator off.
    ///
    /// All drivers are attempted even when one fails; the first error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`ControlError::HardwareFault`] raised by a driver.
    pub fn stop_all(&mut self) -> Result<(), ControlError> {
        let mut first_err = None;
        for (id, actuator) in self.actuators.iter_mut() {
            if let Err(e) = actuator.stop() {
                warn!(actuator = %id, error = %e, "stop failed");
                first_err.get_or_insert(e);
            }
        }
        for (id, indicator) in self.indicators.iter_mut() {
            if let Err(e) = indicator.set_state(false) {
                warn!(indicator = %id, error = %e, "indicator reset failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn get(&self, id: &str) -> Result<&dyn Actuator, ControlError> {
        self.actuators
            .get(id)
            .map(|a| a.as_ref())
            .ok_or_else(|| not_registered("actuator", id))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Box<dyn Actuator>, ControlError> {
        self.actuators
            .get_mut(id)
            .ok_or_else(|| not_registered("actuator", id))
    }
}

fn not_registered(kind: &str, id: &str) -> ControlError {
    ControlError::hardware(id, format!("{kind} '{id}' is not registered"))
}

impl ActuatorInterface for HardwareRegistry {
    fn position(&self, id: &str) -> Result<i64, ControlError> {
        Ok(self.get(id)?.position())
    }

    fn velocity(&self, id: &str) -> Result<f64, ControlError> {
        Ok(self.get(id)?.velocity())
    }

    fn is_encoder_trusted(&self, id: &str) -> bool {
        self.actuators
            .get(id)
            .is_some_and(|a| a.is_encoder_trusted())
    }

    fn set_percent_output(&mut self, id: &str, output: f64) -> Result<(), ControlError> {
        let output = require_finite("output", output)?;
        if !(-1.0..=1.0).contains(&output) {
            return Err(ControlError::invalid(
                "output",
                format!("percent output {output} outside [-1, 1]"),
            ));
        }
        self.get_mut(id)?.set_percent_output(output)
    }

    fn set_velocity_command(&mut self, id: &str, ticks_per_sec: f64) -> Result<(), ControlError> {
        let ticks_per_sec = require_finite("ticks_per_sec", ticks_per_sec)?;
        self.get_mut(id)?.set_velocity(ticks_per_sec)
    }

    fn set_position_command(&mut self, id: &str, ticks: i64) -> Result<(), ControlError> {
        self.get_mut(id)?.set_position(ticks)
    }

    fn stop(&mut self, id: &str) -> Result<(), ControlError> {
        self.get_mut(id)?.stop()
    }
}

impl VisionInterface for HardwareRegistry {
    fn angular_offset(&self) -> f64 {
        self.vision.as_ref().map_or(0.0, |v| v.angular_offset())
    }

    fn vertical_offset(&self) -> f64 {
        self.vision.as_ref().map_or(0.0, |v| v.vertical_offset())
    }

    fn distance(&self) -> Option<f64> {
        self.vision.as_ref().and_then(|v| v.distance())
    }

    fn has_target(&self) -> bool {
        self.vision.as_ref().is_some_and(|v| v.has_target())
    }

    fn pipeline(&self) -> u32 {
        self.vision.as_ref().map_or(0, |v| v.pipeline())
    }

    fn set_pipeline(&mut self, index: u32) -> Result<(), ControlError> {
        match self.vision.as_mut() {
            Some(v) => v.set_pipeline(index),
            None => Err(not_registered("camera", "vision")),
        }
    }
}

impl IndicatorInterface for HardwareRegistry {
    fn set_indicator(&mut self, id: &str, on: bool) -> Result<(), ControlError> {
        match self.indicators.get_mut(id) {
            Some(indicator) => indicator.set_state(on),
            None => Err(not_registered("indicator", id)),
        }
    }

    fn indicator(&self, id: &str) -> bool {
        self.indicators.get(id).is_some_and(|i| i.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    struct MockActuator {
        id: String,
        position: i64,
        last: Option<ActuatorCommand>,
        fail_stop: bool,
    }

    impl MockActuator {
        fn new(id: &str) -> Box<Self> {
            Box::new(Self {
                id: id.to_string(),
                position: 0,
                last: None,
                fail_stop: false,
            })
        }
    }

    impl Actuator for MockActuator {
        fn id(&self) -> &str {
            &self.id
        }
        fn position(&self) -> i64 {
            self.position
        }
        fn velocity(&self) -> f64 {
            0.0
        }
        fn is_encoder_trusted(&self) -> bool {
            true
        }
        fn set_percent_output(&mut self, output: f64) -> Result<(), ControlError> {
            self.last = Some(ActuatorCommand::Percent(output));
            Ok(())
        }
        fn set_velocity(&mut self, ticks_per_sec: f64) -> Result<(), ControlError> {
            self.last = Some(ActuatorCommand::Velocity(ticks_per_sec));
            Ok(())
        }
        fn set_position(&mut self, ticks: i64) -> Result<(), ControlError> {
            self.position = ticks;
            self.last = Some(ActuatorCommand::Position(ticks));
            Ok(())
        }
        fn stop(&mut self) -> Result<(), ControlError> {
            if self.fail_stop {
                return Err(ControlError::hardware(&self.id, "bus timeout"));
            }
            self.last = Some(ActuatorCommand::Stop);
            Ok(())
        }
        fn last_command(&self) -> Option<ActuatorCommand> {
            self.last
        }
    }

    struct MockLight {
        id: String,
        on: bool,
    }

    impl StatusIndicator for MockLight {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_state(&mut self, on: bool) -> Result<(), ControlError> {
            self.on = on;
            Ok(())
        }
        fn state(&self) -> bool {
            self.on
        }
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn routes_commands_by_id() {
        let mut registry = HardwareRegistry::new();
        registry.register_actuator(MockActuator::new("turret"));

        registry.set_position_command("turret", 512).unwrap();
        assert_eq!(registry.position("turret").unwrap(), 512);
        assert_eq!(
            registry.last_command("turret"),
            Some(ActuatorCommand::Position(512))
        );
    }

    #[test]
    fn unknown_actuator_is_hardware_fault() {
        let mut registry = HardwareRegistry::new();
        assert!(matches!(
            registry.stop("nonexistent"),
            Err(ControlError::HardwareFault { .. })
        ));
        assert!(!registry.is_encoder_trusted("nonexistent"));
    }

    #[test]
    fn percent_output_is_validated() {
        let mut registry = HardwareRegistry::new();
        registry.register_actuator(MockActuator::new("hood"));

        assert!(registry.set_percent_output("hood", -1.0).is_ok());
        assert!(matches!(
            registry.set_percent_output("hood", 1.01),
            Err(ControlError::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.set_velocity_command("hood", f64::INFINITY),
            Err(ControlError::InvalidArgument { .. })
        ));
        assert_eq!(
            registry.last_command("hood"),
            Some(ActuatorCommand::Percent(-1.0))
        );
    }

    #[test]
    fn missing_camera_reads_as_no_target() {
        let mut registry = HardwareRegistry::new();
        assert!(!registry.has_target());
        assert_eq!(registry.angular_offset(), 0.0);
        assert_eq!(registry.distance(), None);
        assert!(registry.set_pipeline(0).is_err());
    }

    #[test]
    fn indicators_route_by_id() {
        let mut registry = HardwareRegistry::new();
        registry.register_indicator(Box::new(MockLight {
            id: "on_target".to_string(),
            on: false,
        }));
        registry.set_indicator("on_target", true).unwrap();
        assert!(registry.indicator("on_target"));
        assert!(!registry.indicator("missing"));
        assert!(registry.set_indicator("missing", true).is_err());
    }

    #[test]
    fn stop_all_attempts_every_driver() {
        let mut registry = HardwareRegistry::new();
        let mut broken = MockActuator::new("drive_left");
        broken.fail_stop = true;
        registry.register_actuator(broken);
        registry.register_actuator(MockActuator::new("drive_right"));
        registry.register_indicator(Box::new(MockLight {
            id: "on_target".to_string(),
            on: true,
        }));

        assert!(registry.stop_all().is_err());
        assert_eq!(
            registry.last_command("drive_right"),
            Some(ActuatorCommand::Stop)
        );
        assert!(!registry.indicator("on_target"));
    }

    #[test]
    fn actuator_ids_are_sorted() {
        let mut registry = HardwareRegistry::new();
        registry.register_actuator(MockActuator::new("b"));
        registry.register_actuator(MockActuator::new("a"));
        assert_eq!(registry.actuator_ids(), vec!["a", "b"]);
        assert!(registry.actuator("a").is_some());
    }

    #[test]
    fn re_registering_actuator_replaces_old_driver() {
        let mut registry = HardwareRegistry::new();
        registry.register_actuator(MockActuator::new("joint_x"));
        registry.set_position_command("joint_x", 300).unwrap();

        registry.register_actuator(MockActuator::new("joint_x"));
        assert_eq!(registry.position("joint_x").unwrap(), 0);
    }
}

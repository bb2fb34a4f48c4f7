//! In-process simulated hardware for tests and the CLI shell.
//!
//! [`SimRobot`] builds a [`HardwareRegistry`] populated with simulated
//! drivers and hands back [`SimProbes`] so the caller can observe and perturb
//! the simulated world: read true positions, count stop commands, inject
//! encoder faults, or move the vision target.
//!
//! | Driver | Behaviour |
//! |---|---|
//! | [`SimActuator`] | First-order kinematics capped at `max_ticks_per_sec`. Position commands are tracked by an on-board PID loop (Talon-style motion profile). |
//! | [`SimVision`] | Reports the bearing/elevation of a virtual target relative to linked turret/hood actuators. |
//! | [`SimIndicator`] | Stores its on/off state. |
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use krypton_hal::ActuatorInterface;
//! use krypton_hal::sim::{SimRobot, DRIVE_LEFT};
//!
//! let (mut registry, probes) = SimRobot::new().with_tank_drive(10_000.0).build();
//!
//! registry.set_velocity_command(DRIVE_LEFT, 5_000.0).unwrap();
//! registry.refresh(Duration::from_millis(20));
//! assert_eq!(registry.position(DRIVE_LEFT).unwrap(), 100);
//!
//! // An encoder fault freezes the reported position and marks it untrusted.
//! probes.actuator(DRIVE_LEFT).unwrap().set_encoder_fault(true);
//! registry.refresh(Duration::from_millis(20));
//! assert_eq!(registry.position(DRIVE_LEFT).unwrap(), 100);
//! assert!(!registry.is_encoder_trusted(DRIVE_LEFT));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use krypton_types::{ActuatorCommand, ControlError};
use tracing::trace;

use crate::actuator::Actuator;
use crate::indicator::StatusIndicator;
use crate::pid::PidController;
use crate::registry::HardwareRegistry;
use crate::vision::VisionInterface;

pub const DRIVE_LEFT: &str = "drive_left";
pub const DRIVE_RIGHT: &str = "drive_right";
pub const DRIVE_FRONT_LEFT: &str = "drive_front_left";
pub const DRIVE_FRONT_RIGHT: &str = "drive_front_right";
pub const DRIVE_BACK_LEFT: &str = "drive_back_left";
pub const DRIVE_BACK_RIGHT: &str = "drive_back_right";
pub const TURRET: &str = "turret";
pub const HOOD: &str = "hood";
pub const ON_TARGET_LIGHT: &str = "on_target";

/// Motion-profile gains of the drive motor controllers, in controller native
/// units: output full scale is 1023 and the loop runs every millisecond.
const PROFILE_KP: f64 = 1.0;
const PROFILE_KI: f64 = 0.001;
const PROFILE_KD: f64 = 31.0;
const PROFILE_IZONE: f64 = 30.0;
const NATIVE_FULL_SCALE: f64 = 1023.0;
const NATIVE_LOOP_SECS: f64 = 0.001;

fn position_hold_pid() -> PidController {
    // Convert per-millisecond native gains to per-second percent gains.
    PidController::new(
        PROFILE_KP / NATIVE_FULL_SCALE,
        PROFILE_KI / NATIVE_FULL_SCALE / NATIVE_LOOP_SECS,
        PROFILE_KD / NATIVE_FULL_SCALE * NATIVE_LOOP_SECS,
    )
    .with_output_limits(-1.0, 1.0)
    .with_integral_zone(PROFILE_IZONE)
}

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    // Sim state holds no invariants a panicking test could break.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated actuator
// ────────────────────────────────────────────────────────────────────────────

struct MotorState {
    max_ticks_per_sec: f64,
    position: f64,
    velocity: f64,
    command: Option<ActuatorCommand>,
    pid: PidController,
    /// Readings reported while the encoder is faulted.
    frozen: Option<(i64, f64)>,
    reject_commands: bool,
    stop_count: usize,
    command_count: usize,
}

impl MotorState {
    fn accept(&mut self, id: &str, command: ActuatorCommand) -> Result<(), ControlError> {
        if self.reject_commands {
            return Err(ControlError::hardware(id, "simulated bus fault"));
        }
        if let (ActuatorCommand::Position(new), Some(ActuatorCommand::Position(old))) =
            (command, self.command)
        {
            if new != old {
                self.pid.reset();
            }
        } else if matches!(command, ActuatorCommand::Position(_)) {
            self.pid.reset();
        }
        if command == ActuatorCommand::Stop {
            self.stop_count += 1;
        }
        self.command_count += 1;
        self.command = Some(command);
        trace!(actuator = id, ?command, "sim command");
        Ok(())
    }

    fn step(&mut self, dt: f64) {
        let max = self.max_ticks_per_sec;
        self.velocity = match self.command {
            None | Some(ActuatorCommand::Stop) => 0.0,
            Some(ActuatorCommand::Percent(p)) => p.clamp(-1.0, 1.0) * max,
            Some(ActuatorCommand::Velocity(v)) => v.clamp(-max, max),
            Some(ActuatorCommand::Position(target)) => {
                let error = target as f64 - self.position;
                self.pid.update_error(error, dt) * max
            }
        };
        self.position += self.velocity * dt;
    }

    fn reported(&self) -> (i64, f64) {
        self.frozen
            .unwrap_or((self.position.round() as i64, self.velocity))
    }
}

/// A simulated motor with an encoder.
pub struct SimActuator {
    id: String,
    state: Arc<Mutex<MotorState>>,
}

impl SimActuator {
    /// Create a simulated motor and the probe that observes it.
    pub fn new(id: impl Into<String>, max_ticks_per_sec: f64) -> (Self, SimActuatorProbe) {
        let state = Arc::new(Mutex::new(MotorState {
            max_ticks_per_sec: max_ticks_per_sec.abs(),
            position: 0.0,
            velocity: 0.0,
            command: None,
            pid: position_hold_pid(),
            frozen: None,
            reject_commands: false,
            stop_count: 0,
            command_count: 0,
        }));
        let probe = SimActuatorProbe {
            state: Arc::clone(&state),
        };
        (
            Self {
                id: id.into(),
                state,
            },
            probe,
        )
    }
}

impl Actuator for SimActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i64 {
        lock(&self.state).reported().0
    }

    fn velocity(&self) -> f64 {
        lock(&self.state).reported().1
    }

    fn is_encoder_trusted(&self) -> bool {
        lock(&self.state).frozen.is_none()
    }

    fn set_percent_output(&mut self, output: f64) -> Result<(), ControlError> {
        lock(&self.state).accept(&self.id, ActuatorCommand::Percent(output))
    }

    fn set_velocity(&mut self, ticks_per_sec: f64) -> Result<(), ControlError> {
        lock(&self.state).accept(&self.id, ActuatorCommand::Velocity(ticks_per_sec))
    }

    fn set_position(&mut self, ticks: i64) -> Result<(), ControlError> {
        lock(&self.state).accept(&self.id, ActuatorCommand::Position(ticks))
    }

    fn stop(&mut self) -> Result<(), ControlError> {
        lock(&self.state).accept(&self.id, ActuatorCommand::Stop)
    }

    fn last_command(&self) -> Option<ActuatorCommand> {
        lock(&self.state).command
    }

    fn refresh(&mut self, dt: Duration) {
        lock(&self.state).step(dt.as_secs_f64());
    }
}

/// Observer and fault injector for one [`SimActuator`].  Cheap to clone.
#[derive(Clone)]
pub struct SimActuatorProbe {
    state: Arc<Mutex<MotorState>>,
}

impl SimActuatorProbe {
    /// Physical position, unaffected by encoder faults.
    pub fn true_position(&self) -> f64 {
        lock(&self.state).position
    }

    /// Position as the encoder reports it.
    pub fn reported_position(&self) -> i64 {
        lock(&self.state).reported().0
    }

    pub fn velocity(&self) -> f64 {
        lock(&self.state).velocity
    }

    /// Teleport the motor (e.g. to seed a test) without issuing a command.
    pub fn set_true_position(&self, ticks: f64) {
        lock(&self.state).position = ticks;
    }

    /// Freeze (or thaw) the encoder.  While frozen the last readings are
    /// reported and the encoder is untrusted; the motor keeps moving.
    pub fn set_encoder_fault(&self, faulted: bool) {
        let mut state = lock(&self.state);
        state.frozen = if faulted {
            Some(state.frozen.unwrap_or((state.position.round() as i64, state.velocity)))
        } else {
            None
        };
    }

    /// Make every subsequent command fail with a hardware fault.
    pub fn set_reject_commands(&self, reject: bool) {
        lock(&self.state).reject_commands = reject;
    }

    pub fn last_command(&self) -> Option<ActuatorCommand> {
        lock(&self.state).command
    }

    /// Number of accepted stop commands.
    pub fn stop_count(&self) -> usize {
        lock(&self.state).stop_count
    }

    /// Number of accepted commands of any kind.
    pub fn command_count(&self) -> usize {
        lock(&self.state).command_count
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated vision
// ────────────────────────────────────────────────────────────────────────────

/// A virtual target in robot-relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimTarget {
    /// Horizontal bearing in degrees.
    pub bearing: f64,
    /// Elevation in degrees.
    pub elevation: f64,
    /// Distance in inches, when the pipeline estimates one.
    pub distance: Option<f64>,
}

struct Link {
    probe: SimActuatorProbe,
    ticks_per_degree: f64,
}

impl Link {
    fn degrees(&self) -> f64 {
        if self.ticks_per_degree == 0.0 {
            0.0
        } else {
            self.probe.true_position() / self.ticks_per_degree
        }
    }
}

#[derive(Default)]
struct VisionState {
    target: Option<SimTarget>,
    pipeline: u32,
    pipeline_history: Vec<u32>,
    yaw: Option<Link>,
    pitch: Option<Link>,
}

/// Simulated targeting camera.  Clones share the same state, so a test keeps
/// one clone to move the target while the registry owns another.
#[derive(Clone, Default)]
pub struct SimVision {
    state: Arc<Mutex<VisionState>>,
}

impl SimVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_target(&self, target: Option<SimTarget>) {
        lock(&self.state).target = target;
    }

    /// Every pipeline index ever selected, in order.
    pub fn pipeline_history(&self) -> Vec<u32> {
        lock(&self.state).pipeline_history.clone()
    }

    /// Report horizontal offsets relative to this actuator's heading.
    pub fn link_yaw(&self, probe: SimActuatorProbe, ticks_per_degree: f64) {
        lock(&self.state).yaw = Some(Link {
            probe,
            ticks_per_degree,
        });
    }

    /// Report vertical offsets relative to this actuator's angle.
    pub fn link_pitch(&self, probe: SimActuatorProbe, ticks_per_degree: f64) {
        lock(&self.state).pitch = Some(Link {
            probe,
            ticks_per_degree,
        });
    }
}

impl VisionInterface for SimVision {
    fn angular_offset(&self) -> f64 {
        let state = lock(&self.state);
        let Some(target) = state.target else {
            return 0.0;
        };
        target.bearing - state.yaw.as_ref().map_or(0.0, Link::degrees)
    }

    fn vertical_offset(&self) -> f64 {
        let state = lock(&self.state);
        let Some(target) = state.target else {
            return 0.0;
        };
        target.elevation - state.pitch.as_ref().map_or(0.0, Link::degrees)
    }

    fn distance(&self) -> Option<f64> {
        lock(&self.state).target.and_then(|t| t.distance)
    }

    fn has_target(&self) -> bool {
        lock(&self.state).target.is_some()
    }

    fn pipeline(&self) -> u32 {
        lock(&self.state).pipeline
    }

    fn set_pipeline(&mut self, index: u32) -> Result<(), ControlError> {
        let mut state = lock(&self.state);
        state.pipeline = index;
        state.pipeline_history.push(index);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated indicator
// ────────────────────────────────────────────────────────────────────────────

/// A simulated status light that records its state.
pub struct SimIndicator {
    id: String,
    on: bool,
}

impl SimIndicator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            on: false,
        }
    }
}

impl StatusIndicator for SimIndicator {
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

// ────────────────────────────────────────────────────────────────────────────
// SimRobot builder
// ────────────────────────────────────────────────────────────────────────────

/// Handles returned by [`SimRobot::build`].
#[derive(Clone, Default)]
pub struct SimProbes {
    actuators: HashMap<String, SimActuatorProbe>,
    vision: Option<SimVision>,
}

impl SimProbes {
    pub fn actuator(&self, id: &str) -> Option<&SimActuatorProbe> {
        self.actuators.get(id)
    }

    pub fn vision(&self) -> Option<&SimVision> {
        self.vision.as_ref()
    }
}

/// Builder that constructs a [`HardwareRegistry`] populated with simulated
/// drivers.
///
/// Call the `with_*` methods to add the simulated components you need, then
/// call [`build`][Self::build].  When both a camera and a turret (or hood)
/// are present the camera's offsets follow that actuator.
#[derive(Default)]
pub struct SimRobot {
    actuators: Vec<(String, f64)>,
    indicators: Vec<String>,
    vision: bool,
    turret_ticks_per_degree: Option<f64>,
    hood_ticks_per_degree: Option<f64>,
}

impl SimRobot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two-track drivetrain: [`DRIVE_LEFT`] and [`DRIVE_RIGHT`].
    pub fn with_tank_drive(self, max_ticks_per_sec: f64) -> Self {
        self.with_actuator(DRIVE_LEFT, max_ticks_per_sec)
            .with_actuator(DRIVE_RIGHT, max_ticks_per_sec)
    }

    /// Four-wheel mecanum drivetrain.
    pub fn with_mecanum_drive(self, max_ticks_per_sec: f64) -> Self {
        self.with_actuator(DRIVE_FRONT_LEFT, max_ticks_per_sec)
            .with_actuator(DRIVE_FRONT_RIGHT, max_ticks_per_sec)
            .with_actuator(DRIVE_BACK_LEFT, max_ticks_per_sec)
            .with_actuator(DRIVE_BACK_RIGHT, max_ticks_per_sec)
    }

    pub fn with_turret(mut self, max_ticks_per_sec: f64, ticks_per_degree: f64) -> Self {
        self.turret_ticks_per_degree = Some(ticks_per_degree);
        self.with_actuator(TURRET, max_ticks_per_sec)
    }

    pub fn with_hood(mut self, max_ticks_per_sec: f64, ticks_per_degree: f64) -> Self {
        self.hood_ticks_per_degree = Some(ticks_per_degree);
        self.with_actuator(HOOD, max_ticks_per_sec)
    }

    /// Targeting camera plus the [`ON_TARGET_LIGHT`] indicator.
    pub fn with_vision(mut self) -> Self {
        self.vision = true;
        self.with_indicator(ON_TARGET_LIGHT)
    }

    pub fn with_indicator(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.indicators.contains(&id) {
            self.indicators.push(id);
        }
        self
    }

    pub fn with_actuator(mut self, id: impl Into<String>, max_ticks_per_sec: f64) -> Self {
        self.actuators.push((id.into(), max_ticks_per_sec));
        self
    }

    /// Consume the builder and return the registry plus its probes.
    pub fn build(self) -> (HardwareRegistry, SimProbes) {
        let mut registry = HardwareRegistry::new();
        let mut probes = SimProbes::default();

        for (id, max) in self.actuators {
            let (actuator, probe) = SimActuator::new(id.clone(), max);
            registry.register_actuator(Box::new(actuator));
            probes.actuators.insert(id, probe);
        }
        for id in self.indicators {
            registry.register_indicator(Box::new(SimIndicator::new(id)));
        }
        if self.vision {
            let vision = SimVision::new();
            if let (Some(tpd), Some(probe)) = (self.turret_ticks_per_degree, probes.actuator(TURRET)) {
                vision.link_yaw(probe.clone(), tpd);
            }
            if let (Some(tpd), Some(probe)) = (self.hood_ticks_per_degree, probes.actuator(HOOD)) {
                vision.link_pitch(probe.clone(), tpd);
            }
            registry.register_vision(Box::new(vision.clone()));
            probes.vision = Some(vision);
        }
        (registry, probes)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ActuatorInterface;
    use crate::indicator::IndicatorInterface;

    const CYCLE: Duration = Duration::from_millis(20);

    #[test]
    fn velocity_command_integrates_position() {
        let (mut motor, probe) = SimActuator::new("m", 10_000.0);
        motor.set_velocity(1_000.0).unwrap();
        for _ in 0..50 {
            motor.refresh(CYCLE);
        }
        assert_eq!(motor.position(), 1_000);
        assert!((probe.velocity() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_is_capped_at_max() {
        let (mut motor, probe) = SimActuator::new("m", 500.0);
        motor.set_velocity(-9_000.0).unwrap();
        motor.refresh(CYCLE);
        assert!((probe.velocity() + 500.0).abs() < 1e-9);
    }

    #[test]
    fn percent_output_scales_max_speed() {
        let (mut motor, _probe) = SimActuator::new("m", 10_000.0);
        motor.set_percent_output(0.5).unwrap();
        motor.refresh(Duration::from_secs(1));
        assert_eq!(motor.position(), 5_000);
    }

    #[test]
    fn position_hold_converges() {
        let (mut motor, probe) = SimActuator::new("m", 10_000.0);
        motor.set_position(4_000).unwrap();
        for _ in 0..500 {
            motor.refresh(CYCLE);
        }
        assert!((probe.true_position() - 4_000.0).abs() < 5.0);
    }

    #[test]
    fn stop_is_counted_and_halts() {
        let (mut motor, probe) = SimActuator::new("m", 10_000.0);
        motor.set_velocity(2_000.0).unwrap();
        motor.refresh(CYCLE);
        motor.stop().unwrap();
        motor.refresh(CYCLE);
        assert_eq!(probe.stop_count(), 1);
        assert_eq!(probe.command_count(), 2);
        assert_eq!(probe.velocity(), 0.0);
        assert_eq!(motor.last_command(), Some(ActuatorCommand::Stop));
    }

    #[test]
    fn encoder_fault_freezes_readings() {
        let (mut motor, probe) = SimActuator::new("m", 10_000.0);
        motor.set_velocity(1_000.0).unwrap();
        motor.refresh(CYCLE);
        probe.set_encoder_fault(true);
        motor.refresh(CYCLE);
        assert!(!motor.is_encoder_trusted());
        assert_eq!(motor.position(), 20);
        assert!((probe.true_position() - 40.0).abs() < 1e-9);

        probe.set_encoder_fault(false);
        assert!(motor.is_encoder_trusted());
        assert_eq!(motor.position(), 40);
    }

    #[test]
    fn rejected_commands_are_hardware_faults() {
        let (mut motor, probe) = SimActuator::new("m", 10_000.0);
        probe.set_reject_commands(true);
        assert!(matches!(
            motor.stop(),
            Err(ControlError::HardwareFault { .. })
        ));
        assert_eq!(probe.stop_count(), 0);
    }

    #[test]
    fn vision_follows_linked_turret() {
        let (mut registry, probes) = SimRobot::new()
            .with_turret(10_000.0, 100.0)
            .with_vision()
            .build();
        let vision = probes.vision().unwrap();
        assert!(!registry.has_target());

        vision.set_target(Some(SimTarget {
            bearing: 10.0,
            elevation: 0.0,
            distance: Some(200.0),
        }));
        probes.actuator(TURRET).unwrap().set_true_position(400.0);
        assert!((registry.angular_offset() - 6.0).abs() < 1e-9);
        assert_eq!(registry.distance(), Some(200.0));

        registry.set_pipeline(0).unwrap();
        registry.set_pipeline(1).unwrap();
        assert_eq!(vision.pipeline_history(), vec![0, 1]);
        assert_eq!(registry.pipeline(), 1);
    }

    #[test]
    fn full_robot_builds_without_hardware() {
        let (mut registry, probes) = SimRobot::new()
            .with_tank_drive(10_000.0)
            .with_turret(5_000.0, 50.0)
            .with_hood(2_000.0, 20.0)
            .with_vision()
            .build();

        assert_eq!(
            registry.actuator_ids(),
            vec![DRIVE_LEFT, DRIVE_RIGHT, HOOD, TURRET]
        );
        registry.set_indicator(ON_TARGET_LIGHT, true).unwrap();
        registry.stop_all().unwrap();
        assert!(!registry.indicator(ON_TARGET_LIGHT));
        assert_eq!(probes.actuator(HOOD).unwrap().stop_count(), 1);
    }

    #[test]
    fn mecanum_drive_registers_four_wheels() {
        let (registry, probes) = SimRobot::new().with_mecanum_drive(8_000.0).build();
        assert_eq!(registry.actuator_ids().len(), 4);
        assert!(probes.actuator(DRIVE_BACK_RIGHT).is_some());
    }
}

//! Scheduler-facing [`Command`] wrappers around the controllers.
//!
//! | Command | Requires | Finishes when |
//! |---|---|---|
//! | [`DriveMotionCommand`] | [`DRIVETRAIN`] | the drive settles |
//! | [`AimCommand`] | its actuator id and [`VISION`] | on target, if configured |
//! | [`TapeApproachCommand`] | [`DRIVETRAIN`] | every tape offset is within ±0.05 after scaling |
//!
//! A controller that halts surfaces its fault as an `execute` error, so the
//! scheduler cancels the command and releases its requirements.

use krypton_hal::{ActuatorInterface, IndicatorInterface, Tunables, VisionInterface};
use krypton_kernel::Command;
use krypton_types::{ControlError, MotionRequest, ToleranceWindow};
use tracing::debug;

use crate::aim::{AimController, AimState};
use crate::drive::{DriveController, DriveControllerConfig, DriveState};
use crate::mix::VelocityInput;

/// Resource name shared by every drivetrain command.
pub const DRIVETRAIN: &str = "drivetrain";

/// Resource name shared by every aim command.  The camera has one active
/// pipeline, so only one aim may own it at a time.
pub const VISION: &str = "vision";

pub const TAPE_STRAFE_KEY: &str = "cameraTable/tapeStrafe";
pub const TAPE_DISTANCE_KEY: &str = "cameraTable/tapeDistance";
pub const TAPE_ANGLE_KEY: &str = "cameraTable/tapeAngle";

fn halted_fault(fault: Option<&ControlError>, component: &str) -> ControlError {
    fault
        .cloned()
        .unwrap_or_else(|| ControlError::hardware(component, "controller halted"))
}

// ────────────────────────────────────────────────────────────────────────────
// Drive motion
// ────────────────────────────────────────────────────────────────────────────

/// Runs one [`MotionRequest`] on a [`DriveController`].
pub struct DriveMotionCommand<H: ActuatorInterface> {
    name: String,
    request: MotionRequest,
    controller: DriveController<H>,
    requirements: Vec<String>,
}

impl<H: ActuatorInterface> DriveMotionCommand<H> {
    pub fn new(name: impl Into<String>, controller: DriveController<H>, request: MotionRequest) -> Self {
        Self {
            name: name.into(),
            request,
            controller,
            requirements: vec![DRIVETRAIN.to_string()],
        }
    }

    pub fn request(&self) -> &MotionRequest {
        &self.request
    }

    pub fn controller(&self) -> &DriveController<H> {
        &self.controller
    }
}

impl<H: ActuatorInterface> Command for DriveMotionCommand<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[String] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), ControlError> {
        self.controller.initialize(self.request)
    }

    fn execute(&mut self) -> Result<(), ControlError> {
        self.controller.execute();
        if self.controller.state() == DriveState::Halted {
            return Err(halted_fault(self.controller.fault(), DRIVETRAIN));
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.controller.is_finished()
    }

    fn end(&mut self, interrupted: bool) {
        self.controller.end(interrupted);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aim
// ────────────────────────────────────────────────────────────────────────────

/// Runs an [`AimController`] until it is on target (when it finishes on
/// target) or until cancelled.
pub struct AimCommand<H>
where
    H: ActuatorInterface + VisionInterface + IndicatorInterface,
{
    name: String,
    controller: AimController<H>,
    requirements: Vec<String>,
}

impl<H> AimCommand<H>
where
    H: ActuatorInterface + VisionInterface + IndicatorInterface,
{
    pub fn new(name: impl Into<String>, controller: AimController<H>) -> Self {
        let requirements = vec![controller.config().actuator.clone(), VISION.to_string()];
        Self {
            name: name.into(),
            controller,
            requirements,
        }
    }

    pub fn controller(&self) -> &AimController<H> {
        &self.controller
    }
}

impl<H> Command for AimCommand<H>
where
    H: ActuatorInterface + VisionInterface + IndicatorInterface,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[String] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), ControlError> {
        self.controller.initialize()
    }

    fn execute(&mut self) -> Result<(), ControlError> {
        self.controller.execute();
        if self.controller.state() == AimState::Halted {
            return Err(halted_fault(
                self.controller.fault(),
                &self.controller.config().actuator,
            ));
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.controller.is_finished()
    }

    fn end(&mut self, interrupted: bool) {
        self.controller.end(interrupted);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tape approach
// ────────────────────────────────────────────────────────────────────────────

/// Drives toward a floor tape using offsets a co-processor publishes as
/// tunables.  The offsets are re-read every cycle and scaled into a velocity
/// feed: strafe / 50, distance / 36, angle / 10.
pub struct TapeApproachCommand<H: ActuatorInterface, T: Tunables> {
    controller: DriveController<H>,
    tunables: T,
    requirements: Vec<String>,
}

impl<H: ActuatorInterface, T: Tunables> TapeApproachCommand<H, T> {
    pub const STRAFE_SCALE: f64 = 50.0;
    pub const DISTANCE_SCALE: f64 = 36.0;
    pub const ANGLE_SCALE: f64 = 10.0;
    pub const TOLERANCE: f64 = 0.05;

    /// Build the command on top of `config`, forcing a velocity feed that
    /// finishes inside `±TOLERANCE`.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when `config` is invalid.
    pub fn new(hw: H, config: DriveControllerConfig, tunables: T) -> Result<Self, ControlError> {
        let config = DriveControllerConfig {
            finish_velocity_within_tolerance: true,
            velocity_tolerance: ToleranceWindow::symmetric(Self::TOLERANCE),
            ..config
        };
        Ok(Self {
            controller: DriveController::new(hw, config)?,
            tunables,
            requirements: vec![DRIVETRAIN.to_string()],
        })
    }

    /// Current feed derived from the tunables.
    pub fn input(&self) -> VelocityInput {
        VelocityInput {
            strafe: self.tunables.number(TAPE_STRAFE_KEY, 0.0) / Self::STRAFE_SCALE,
            forward: self.tunables.number(TAPE_DISTANCE_KEY, 0.0) / Self::DISTANCE_SCALE,
            rotate: self.tunables.number(TAPE_ANGLE_KEY, 0.0) / Self::ANGLE_SCALE,
        }
    }

    pub fn controller(&self) -> &DriveController<H> {
        &self.controller
    }
}

impl<H: ActuatorInterface, T: Tunables> Command for TapeApproachCommand<H, T> {
    fn name(&self) -> &str {
        "tape_approach"
    }

    fn requirements(&self) -> &[String] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), ControlError> {
        let VelocityInput {
            strafe,
            forward,
            rotate,
        } = self.input();
        self.controller.initialize(MotionRequest::AbsoluteVelocity {
            strafe,
            forward,
            rotate,
        })
    }

    fn execute(&mut self) -> Result<(), ControlError> {
        let input = self.input();
        debug!(?input, "tape offsets");
        self.controller.set_velocity_input(input)?;
        self.controller.execute();
        if self.controller.state() == DriveState::Halted {
            return Err(halted_fault(self.controller.fault(), DRIVETRAIN));
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.controller.is_finished()
    }

    fn end(&mut self, interrupted: bool) {
        self.controller.end(interrupted);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::aim::AimConfig;
    use krypton_hal::sim::{DRIVE_LEFT, DRIVE_RIGHT, HOOD, SimRobot, SimTarget, TURRET};
    use krypton_hal::{HardwareRegistry, SharedTunables};
    use krypton_kernel::CommandScheduler;
    use krypton_types::ActuatorCommand;

    const CYCLE: Duration = Duration::from_millis(20);

    type Hw = Arc<Mutex<HardwareRegistry>>;

    fn drive(hw: &Hw, request: MotionRequest) -> Box<DriveMotionCommand<Hw>> {
        let controller = DriveController::new(Arc::clone(hw), DriveControllerConfig::default()).unwrap();
        Box::new(DriveMotionCommand::new("drive", controller, request))
    }

    fn cycle(scheduler: &mut CommandScheduler, hw: &Hw) -> usize {
        hw.lock().unwrap().refresh(CYCLE);
        scheduler.run_cycle().len()
    }

    #[test]
    fn drive_command_runs_to_completion() {
        let (registry, probes) = SimRobot::new().with_tank_drive(10_000.0).build();
        let hw = Arc::new(Mutex::new(registry));
        let mut scheduler = CommandScheduler::new();
        let handle = scheduler
            .schedule(drive(&hw, MotionRequest::RelativeDistance { inches: 10.0 }))
            .unwrap();

        let mut cycles = 0;
        while scheduler.is_scheduled(handle) {
            cycle(&mut scheduler, &hw);
            cycles += 1;
            assert!(cycles < 1_000, "drive never finished");
        }
        // One stop on settle, one from end.
        assert_eq!(probes.actuator(DRIVE_LEFT).unwrap().stop_count(), 2);
        assert!(scheduler.holder(DRIVETRAIN).is_none());
    }

    #[test]
    fn second_drive_command_conflicts() {
        let (registry, _probes) = SimRobot::new().with_tank_drive(10_000.0).build();
        let hw = Arc::new(Mutex::new(registry));
        let mut scheduler = CommandScheduler::new();
        scheduler
            .schedule(drive(&hw, MotionRequest::RelativeDistance { inches: 10.0 }))
            .unwrap();
        let err = scheduler
            .schedule(drive(&hw, MotionRequest::RelativeDistance { inches: 5.0 }))
            .unwrap_err();
        assert!(matches!(err, ControlError::ResourceConflict { .. }));
    }

    #[test]
    fn halted_drive_is_cancelled() {
        let (registry, probes) = SimRobot::new().with_tank_drive(10_000.0).build();
        let hw = Arc::new(Mutex::new(registry));
        let mut scheduler = CommandScheduler::new();
        let handle = scheduler
            .schedule(drive(&hw, MotionRequest::RelativeDistance { inches: 10.0 }))
            .unwrap();
        probes.actuator(DRIVE_LEFT).unwrap().set_encoder_fault(true);
        probes.actuator(DRIVE_RIGHT).unwrap().set_encoder_fault(true);
        assert_eq!(cycle(&mut scheduler, &hw), 1);
        assert!(!scheduler.is_scheduled(handle));
        assert!(scheduler.holder(DRIVETRAIN).is_none());
    }

    #[test]
    fn aim_command_requires_its_actuator() {
        let (registry, probes) = SimRobot::new()
            .with_turret(5_000.0, 100.0)
            .with_vision()
            .build();
        let hw = Arc::new(Mutex::new(registry));
        let controller =
            AimController::new(Arc::clone(&hw), AimConfig::turret(), CYCLE).unwrap();
        let command = AimCommand::new("turret_track", controller);
        assert_eq!(
            command.requirements(),
            [TURRET.to_string(), VISION.to_string()]
        );

        probes.vision().unwrap().set_target(Some(SimTarget {
            bearing: 3.0,
            elevation: 0.0,
            distance: None,
        }));
        let mut scheduler = CommandScheduler::new();
        let handle = scheduler.schedule(Box::new(command)).unwrap();
        for _ in 0..20 {
            cycle(&mut scheduler, &hw);
        }
        // Turret tracking never finishes on its own.
        assert!(scheduler.is_scheduled(handle));
        assert!(scheduler.cancel(handle));
        assert_eq!(
            probes.actuator(TURRET).unwrap().last_command(),
            Some(ActuatorCommand::Stop)
        );
    }

    fn aim(hw: &Hw, name: &str, config: AimConfig) -> Box<AimCommand<Hw>> {
        let controller = AimController::new(Arc::clone(hw), config, CYCLE).unwrap();
        Box::new(AimCommand::new(name, controller))
    }

    #[test]
    fn aim_commands_share_the_camera() {
        let (registry, probes) = SimRobot::new()
            .with_turret(5_000.0, 100.0)
            .with_hood(5_000.0, 100.0)
            .with_vision()
            .build();
        let hw = Arc::new(Mutex::new(registry));
        hw.lock().unwrap().set_pipeline(1).unwrap();

        let mut scheduler = CommandScheduler::new();
        let turret = scheduler
            .schedule(aim(&hw, "turret_aim", AimConfig::turret()))
            .unwrap();
        let err = scheduler
            .schedule(aim(&hw, "hood_aim", AimConfig::hood()))
            .unwrap_err();
        match err {
            ControlError::ResourceConflict { resource, holder } => {
                assert_eq!(resource, VISION);
                assert_eq!(holder, format!("turret_aim{turret}"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The rejected hood never touched its actuator or the camera.
        assert_eq!(probes.actuator(HOOD).unwrap().last_command(), None);
        assert_eq!(hw.lock().unwrap().pipeline(), 0);

        cycle(&mut scheduler, &hw);
        assert!(scheduler.cancel(turret));
        assert_eq!(hw.lock().unwrap().pipeline(), 1);
        assert!(scheduler.holder(VISION).is_none());

        // Once the camera is free the hood can take it, and hands it back
        // on the operator's pipeline too.
        let hood = scheduler
            .schedule(aim(&hw, "hood_aim", AimConfig::hood()))
            .unwrap();
        assert_eq!(scheduler.holder(VISION), Some(format!("hood_aim{hood}").as_str()));
        cycle(&mut scheduler, &hw);
        assert!(scheduler.cancel(hood));
        assert_eq!(hw.lock().unwrap().pipeline(), 1);
        assert_eq!(probes.vision().unwrap().pipeline_history(), vec![1, 0, 1, 0, 1]);
    }

    #[test]
    fn tape_approach_follows_tunables_until_close() {
        let (registry, probes) = SimRobot::new().with_tank_drive(10_000.0).build();
        let hw = Arc::new(Mutex::new(registry));
        let tunables = SharedTunables::new();
        tunables.set(TAPE_DISTANCE_KEY, 18.0);

        let command =
            TapeApproachCommand::new(Arc::clone(&hw), DriveControllerConfig::default(), tunables.clone())
                .unwrap();
        assert_eq!(command.input().forward, 0.5);

        let mut scheduler = CommandScheduler::new();
        let handle = scheduler.schedule(Box::new(command)).unwrap();
        cycle(&mut scheduler, &hw);
        assert_eq!(
            probes.actuator(DRIVE_RIGHT).unwrap().last_command(),
            Some(ActuatorCommand::Velocity(5_000.0))
        );

        // The co-processor reports the tape close enough.
        tunables.set(TAPE_DISTANCE_KEY, 1.0);
        tunables.set(TAPE_ANGLE_KEY, -0.4);
        assert_eq!(cycle(&mut scheduler, &hw), 1);
        assert!(!scheduler.is_scheduled(handle));
    }

    #[test]
    fn tape_defaults_to_zero_offsets() {
        let (registry, _probes) = SimRobot::new().with_tank_drive(10_000.0).build();
        let hw = Arc::new(Mutex::new(registry));
        let command =
            TapeApproachCommand::new(hw, DriveControllerConfig::default(), SharedTunables::new())
                .unwrap();
        assert_eq!(command.input(), VelocityInput::ZERO);
    }
}

//! [`Robot`] – composition root for the simulated robot.
//!
//! Owns the [`HardwareRegistry`] (behind the control loop), the shared
//! tunables table and the operator's aim trim, and builds commands wired to
//! them.  Nothing below this layer reaches for globals: every controller gets
//! its hardware handle and configuration from here.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use krypton_control::{
    AimAxis, AimCommand, AimConfig, AimController, DriveController, DriveControllerConfig,
    DriveMotionCommand, TapeApproachCommand,
};
use krypton_hal::sim::{SimProbes, SimRobot};
use krypton_hal::{ActuatorInterface, HardwareRegistry, IndicatorInterface, SharedTunables};
use krypton_kernel::CommandHandle;
use krypton_types::{ActuatorState, ControlError, ControlMode, MotionRequest, require_finite};
use tracing::info;

use crate::config::RobotConfig;
use crate::control_loop::{ControlLoop, RunOutcome};

type SharedHw = Arc<Mutex<HardwareRegistry>>;

/// Point-in-time view of the robot for the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotStatus {
    pub actuators: Vec<ActuatorState>,
    /// Names of the commands currently scheduled.
    pub running: Vec<String>,
    pub on_target: bool,
    pub cycles: u64,
    pub overruns: u64,
    pub worst_cycle: Duration,
}

pub struct Robot {
    config: RobotConfig,
    control: ControlLoop,
    probes: SimProbes,
    tunables: SharedTunables,
    turret_trim: f64,
    hood_trim: f64,
}

impl Robot {
    /// Build a simulated robot: drivetrain, turret, hood, camera and the
    /// on-target light.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when `config` is invalid.
    pub fn simulated(mut config: RobotConfig) -> Result<Self, ControlError> {
        config.validate()?;

        let sim = &config.sim;
        let mut builder = SimRobot::new();
        builder = if sim.mecanum {
            if config.drive.layout == DriveControllerConfig::tank_layout() {
                config.drive.layout = DriveControllerConfig::mecanum_layout();
            }
            builder.with_mecanum_drive(sim.drive_max_ticks_per_sec)
        } else {
            builder.with_tank_drive(sim.drive_max_ticks_per_sec)
        };
        let (registry, probes) = builder
            .with_turret(sim.aim_max_ticks_per_sec, sim.aim_ticks_per_degree)
            .with_hood(sim.aim_max_ticks_per_sec, sim.aim_ticks_per_degree)
            .with_vision()
            .build();

        let tunables: SharedTunables = config
            .tunables
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let control = ControlLoop::new(Arc::new(Mutex::new(registry)), config.control_period());

        info!(
            period_ms = config.control_period_ms,
            mecanum = config.sim.mecanum,
            "simulated robot ready"
        );
        Ok(Self {
            config,
            control,
            probes,
            tunables,
            turret_trim: 0.0,
            hood_trim: 0.0,
        })
    }

    /// Sleep out each control period while running.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.control = self.control.with_realtime(realtime);
        self
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn probes(&self) -> &SimProbes {
        &self.probes
    }

    pub fn tunables(&self) -> &SharedTunables {
        &self.tunables
    }

    pub fn control(&self) -> &ControlLoop {
        &self.control
    }

    fn hw(&self) -> SharedHw {
        Arc::clone(self.control.hardware())
    }

    /// Schedule a drivetrain motion with the configured controller settings.
    ///
    /// # Errors
    ///
    /// Construction, scheduling or `initialize` errors, e.g.
    /// [`ControlError::ResourceConflict`] while another drive command runs.
    pub fn drive(&mut self, request: MotionRequest) -> Result<CommandHandle, ControlError> {
        let config = self.config.drive.clone();
        self.schedule_drive(request, config)
    }

    /// Move `inches` using one position command per track.
    ///
    /// # Errors
    ///
    /// See [`drive`][Self::drive].
    pub fn hold(&mut self, inches: f64) -> Result<CommandHandle, ControlError> {
        let config = DriveControllerConfig {
            mode: ControlMode::ClosedLoopPosition,
            ..self.config.drive.clone()
        };
        self.schedule_drive(MotionRequest::RelativeDistance { inches }, config)
    }

    fn schedule_drive(
        &mut self,
        request: MotionRequest,
        config: DriveControllerConfig,
    ) -> Result<CommandHandle, ControlError> {
        let name = match request {
            MotionRequest::RelativeDistance { .. } => "drive",
            MotionRequest::RelativeRotation { .. } => "curve",
            MotionRequest::AbsoluteVelocity { .. } => "velocity",
            MotionRequest::AngularError { .. } => {
                return Err(ControlError::invalid(
                    "request",
                    "angular errors steer the turret or hood; use aim",
                ));
            }
        };
        let controller = DriveController::new(self.hw(), config)?;
        self.control
            .schedule(Box::new(DriveMotionCommand::new(name, controller, request)))
    }

    /// Start vision tracking on the turret (`Yaw`) or hood (`Elevation`),
    /// carrying the operator's trim for that axis.
    ///
    /// # Errors
    ///
    /// Construction, scheduling or `initialize` errors.
    pub fn aim(&mut self, axis: AimAxis) -> Result<CommandHandle, ControlError> {
        let (config, trim, name) = match axis {
            AimAxis::Yaw => (self.config.turret.clone(), self.turret_trim, "turret_aim"),
            AimAxis::Elevation => (self.config.hood.clone(), self.hood_trim, "hood_aim"),
        };
        let mut controller = AimController::new(self.hw(), config, self.control.period())?;
        controller.set_adjustment(trim)?;
        self.control
            .schedule(Box::new(AimCommand::new(name, controller)))
    }

    /// Drive onto the floor tape using the `cameraTable/tape*` tunables.
    ///
    /// # Errors
    ///
    /// Construction, scheduling or `initialize` errors.
    pub fn tape(&mut self) -> Result<CommandHandle, ControlError> {
        let command =
            TapeApproachCommand::new(self.hw(), self.config.drive.clone(), self.tunables.clone())?;
        self.control.schedule(Box::new(command))
    }

    /// Shift the aim trim of `axis` by `delta` degrees and return the new
    /// value.  Applies to aim commands started afterwards.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when `delta` is not finite.
    pub fn trim(&mut self, axis: AimAxis, delta: f64) -> Result<f64, ControlError> {
        let delta = require_finite("trim", delta)?;
        let trim = match axis {
            AimAxis::Yaw => &mut self.turret_trim,
            AimAxis::Elevation => &mut self.hood_trim,
        };
        *trim += delta;
        info!(?axis, trim = *trim, "aim trim adjusted");
        Ok(*trim)
    }

    pub fn aim_config(&self, axis: AimAxis) -> &AimConfig {
        match axis {
            AimAxis::Yaw => &self.config.turret,
            AimAxis::Elevation => &self.config.hood,
        }
    }

    pub fn run(&mut self, stop: &AtomicBool, max_cycles: Option<u64>) -> RunOutcome {
        self.control.run(stop, max_cycles)
    }

    pub fn cancel_all(&mut self) {
        self.control.cancel_all();
    }

    /// # Errors
    ///
    /// See [`ControlLoop::shutdown`].
    pub fn shutdown(&mut self) -> Result<(), ControlError> {
        self.control.shutdown()
    }

    pub fn status(&self) -> RobotStatus {
        let hw = self.hw();
        let ids = hw.lock().map(|r| r.actuator_ids()).unwrap_or_default();
        let actuators = ids.iter().filter_map(|id| hw.state(id).ok()).collect();
        let on_target = self
            .config
            .turret
            .indicator
            .as_deref()
            .is_some_and(|id| hw.indicator(id));
        let watchdog = self.control.watchdog();
        RobotStatus {
            actuators,
            running: self.control.scheduler().scheduled_names(),
            on_target,
            cycles: watchdog.cycles(),
            overruns: watchdog.overruns(),
            worst_cycle: watchdog.worst_cycle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krypton_control::VISION;
    use krypton_control::commands::TAPE_DISTANCE_KEY;
    use krypton_hal::sim::{DRIVE_FRONT_LEFT, DRIVE_RIGHT, HOOD, SimTarget, TURRET};
    use krypton_types::ActuatorCommand;

    const LIMIT: Option<u64> = Some(5_000);

    fn robot() -> Robot {
        Robot::simulated(RobotConfig::default()).unwrap()
    }

    #[test]
    fn drive_runs_to_completion() {
        let mut robot = robot();
        robot
            .drive(MotionRequest::RelativeDistance { inches: 24.0 })
            .unwrap();
        assert_eq!(robot.run(&AtomicBool::new(false), LIMIT), RunOutcome::Idle);
        assert!(robot.probes().actuator(DRIVE_RIGHT).unwrap().true_position() > 0.0);
    }

    #[test]
    fn drivetrain_is_exclusive() {
        let mut robot = robot();
        robot
            .drive(MotionRequest::RelativeDistance { inches: 24.0 })
            .unwrap();
        let err = robot.hold(12.0).unwrap_err();
        assert!(matches!(err, ControlError::ResourceConflict { .. }));
        assert_eq!(robot.status().running, vec!["drive".to_string()]);
    }

    #[test]
    fn hold_uses_position_commands() {
        let mut robot = robot();
        robot.hold(12.0).unwrap();
        let last = robot.probes().actuator(DRIVE_RIGHT).unwrap().last_command();
        assert!(matches!(last, Some(ActuatorCommand::Position(t)) if t > 0));
    }

    #[test]
    fn turret_and_hood_take_turns_on_the_camera() {
        let mut robot = robot();
        robot.probes().vision().unwrap().set_target(Some(SimTarget {
            bearing: 10.0,
            elevation: 5.0,
            distance: None,
        }));
        robot.aim(AimAxis::Elevation).unwrap();
        let err = robot.aim(AimAxis::Yaw).unwrap_err();
        assert!(matches!(
            err,
            ControlError::ResourceConflict { ref resource, .. } if resource == VISION
        ));

        // The hood finishes on target and frees the camera.
        assert_eq!(robot.run(&AtomicBool::new(false), Some(500)), RunOutcome::Idle);
        let hood_deg = robot.probes().actuator(HOOD).unwrap().true_position() / 100.0;
        assert!((hood_deg - 5.0).abs() <= 1.0);

        robot.aim(AimAxis::Yaw).unwrap();
        robot.run(&AtomicBool::new(false), Some(500));
        // The turret keeps tracking.
        assert_eq!(robot.status().running, vec!["turret_aim".to_string()]);
        let turret_deg = robot.probes().actuator(TURRET).unwrap().true_position() / 100.0;
        assert!((turret_deg - 10.0).abs() <= 1.0);
        assert!(robot.status().on_target);
        assert_eq!(robot.probes().vision().unwrap().pipeline_history(), vec![0, 0, 0]);
    }

    #[test]
    fn drive_refuses_angular_errors() {
        let mut robot = robot();
        let err = robot
            .drive(MotionRequest::AngularError {
                degrees: 4.0,
                distance_inches: Some(200.0),
            })
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidArgument { .. }));
        assert!(robot.status().running.is_empty());
    }

    #[test]
    fn hood_aims_high_for_long_shots() {
        let mut robot = robot();
        robot.probes().vision().unwrap().set_target(Some(SimTarget {
            bearing: 0.0,
            elevation: 10.0,
            distance: Some(280.0),
        }));
        robot.aim(AimAxis::Elevation).unwrap();
        robot.run(&AtomicBool::new(false), Some(1));

        // 100" past the threshold takes 1 + 0.02 · 100 = 3 degrees off the
        // 10 degree offset; uncompensated, the output would clamp at 0.3.
        match robot.probes().actuator(HOOD).unwrap().last_command() {
            Some(ActuatorCommand::Percent(p)) => assert!((p - 0.03 * 7.0).abs() < 1e-9),
            other => panic!("expected percent output, got {other:?}"),
        }

        assert_eq!(robot.run(&AtomicBool::new(false), Some(500)), RunOutcome::Idle);
        let hood_deg = robot.probes().actuator(HOOD).unwrap().true_position() / 100.0;
        assert!((hood_deg - 7.0).abs() <= 1.0);
    }

    #[test]
    fn trim_accumulates_and_rejects_nan() {
        let mut robot = robot();
        assert_eq!(robot.trim(AimAxis::Elevation, 0.5).unwrap(), 0.5);
        assert_eq!(robot.trim(AimAxis::Elevation, 0.25).unwrap(), 0.75);
        assert_eq!(robot.trim(AimAxis::Yaw, -1.0).unwrap(), -1.0);
        assert!(robot.trim(AimAxis::Yaw, f64::NAN).is_err());
    }

    #[test]
    fn tape_finishes_once_offsets_are_small() {
        let mut robot = robot();
        robot.tunables().set(TAPE_DISTANCE_KEY, 36.0);
        robot.tape().unwrap();
        assert_eq!(
            robot.run(&AtomicBool::new(false), Some(10)),
            RunOutcome::CycleLimit
        );

        robot.tunables().set(TAPE_DISTANCE_KEY, 1.0);
        assert_eq!(robot.run(&AtomicBool::new(false), LIMIT), RunOutcome::Idle);
    }

    #[test]
    fn config_tunables_seed_the_table() {
        let mut config = RobotConfig::default();
        config.tunables.insert(TAPE_DISTANCE_KEY.to_string(), 12.0);
        let robot = Robot::simulated(config).unwrap();
        assert_eq!(robot.tunables().snapshot().get(TAPE_DISTANCE_KEY), Some(&12.0));
    }

    #[test]
    fn mecanum_sim_swaps_default_layout() {
        let mut config = RobotConfig::default();
        config.sim.mecanum = true;
        let mut robot = Robot::simulated(config).unwrap();
        assert_eq!(robot.config().drive.layout, DriveControllerConfig::mecanum_layout());
        robot
            .drive(MotionRequest::RelativeDistance { inches: 12.0 })
            .unwrap();
        assert_eq!(robot.run(&AtomicBool::new(false), LIMIT), RunOutcome::Idle);
        assert!(robot.probes().actuator(DRIVE_FRONT_LEFT).unwrap().true_position() < 0.0);
    }

    #[test]
    fn status_lists_every_actuator() {
        let robot = robot();
        let status = robot.status();
        assert_eq!(status.actuators.len(), 4);
        assert!(status.running.is_empty());
        assert!(!status.on_target);
        assert_eq!(status.cycles, 0);
    }

    #[test]
    fn shutdown_cancels_and_stops() {
        let mut robot = robot();
        robot
            .drive(MotionRequest::RelativeDistance { inches: 240.0 })
            .unwrap();
        robot.run(&AtomicBool::new(false), Some(3));
        robot.shutdown().unwrap();
        assert!(robot.status().running.is_empty());
        assert_eq!(
            robot.probes().actuator(DRIVE_RIGHT).unwrap().last_command(),
            Some(ActuatorCommand::Stop)
        );
    }
}

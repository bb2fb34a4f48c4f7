//! [`DriveController`] – closed-loop drivetrain motion with sensor-loss
//! fallback.
//!
//! ```text
//!             initialize(positional)            all errors in tolerance
//!   Idle ──► Planning ──► Tracking ─────────────────────────────► Settled
//!    ▲          │            │  ▲ execute() every cycle              │
//!    │          │ degenerate │  └──────┘                             │
//!    │          └────────────┼──────────────────────────────────────►│
//!    │                       │ hardware error / no usable reference  │
//!    │                       ▼                                       │
//!    │                    Halted                                     │
//!    └──────────────── end(interrupted) ◄────────────────────────────┘
//! ```
//!
//! Every cycle the controller first asks each actuator whether its encoder is
//! trusted.  The first untrusted reading latches that actuator as untrusted
//! until the next `initialize`, logs a sensor fault, and switches the whole
//! group to [`ControlMode::OpenLoopPercent`]: without a trustworthy encoder
//! a closed-loop velocity or position command would chase a stale value.
//! Untrusted actuators are then driven from the trusted actuator with the
//! largest planned speed ratio.
//!
//! The worst case is always the same: stop every actuator, enter
//! [`DriveState::Halted`], and report not finished.

use std::fmt;

use krypton_hal::ActuatorInterface;
use krypton_types::{
    ActuatorState, ControlError, ControlMode, Mount, MotionPlan, MotionRequest, Polarity,
    ToleranceWindow, TrackConfig, require_finite,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::limiter::RatioClampedSpeedLimiter;
use crate::mix::{ReversalCooldown, VelocityInput, mix};
use crate::planner::{PositionTargetPlanner, validate_layout};
use crate::units::DriveGeometry;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Drive controller settings.  Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveControllerConfig {
    pub layout: Vec<TrackConfig>,
    pub geometry: DriveGeometry,
    /// Mode selected at `initialize`.
    pub mode: ControlMode,
    /// Proportional gain from tick error to ticks/s.
    pub gain: f64,
    /// Group speed cap in ticks/s.
    pub max_speed: f64,
    /// Free speed of the motors in ticks/s.  Open-loop output approximates
    /// `max_speed` as a fraction of it.
    pub rated_speed: f64,
    /// Positional completion window, in ticks.
    pub tolerance: ToleranceWindow,
    /// Completion window for velocity-feed inputs, in normalised units.
    pub velocity_tolerance: ToleranceWindow,
    /// Finish a velocity feed once every input component is inside
    /// `velocity_tolerance`.  When `false` a velocity feed runs until ended.
    pub finish_velocity_within_tolerance: bool,
    /// Per-cycle decay of the forward reversal cooldown; `None` disables it.
    pub reversal_cooldown: Option<f64>,
}

impl Default for DriveControllerConfig {
    fn default() -> Self {
        Self {
            layout: Self::tank_layout(),
            geometry: DriveGeometry::default(),
            mode: ControlMode::ClosedLoopVelocity,
            gain: 1.0,
            max_speed: 10_000.0,
            rated_speed: 10_000.0,
            tolerance: ToleranceWindow::symmetric(50.0),
            velocity_tolerance: ToleranceWindow::symmetric(0.05),
            finish_velocity_within_tolerance: false,
            reversal_cooldown: None,
        }
    }
}

impl DriveControllerConfig {
    /// Two tracks; the left encoder counts down when driving forward.
    pub fn tank_layout() -> Vec<TrackConfig> {
        vec![
            TrackConfig::new("drive_left", Mount::Left, Polarity::Inverted),
            TrackConfig::new("drive_right", Mount::Right, Polarity::Normal),
        ]
    }

    /// Four mecanum wheels; left-side encoders count down when driving
    /// forward.
    pub fn mecanum_layout() -> Vec<TrackConfig> {
        vec![
            TrackConfig::new("drive_front_left", Mount::FrontLeft, Polarity::Inverted),
            TrackConfig::new("drive_front_right", Mount::FrontRight, Polarity::Normal),
            TrackConfig::new("drive_back_left", Mount::BackLeft, Polarity::Inverted),
            TrackConfig::new("drive_back_right", Mount::BackRight, Polarity::Normal),
        ]
    }

    /// Open-loop output that approximates `max_speed`:
    /// `min(max_speed / rated_speed, 1)`.
    pub fn open_loop_percent_limit(&self) -> f64 {
        (self.max_speed / self.rated_speed).min(1.0)
    }

    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ControlError> {
        validate_layout(&self.layout)?;
        self.geometry.validate()?;
        for (name, value) in [
            ("gain", self.gain),
            ("max_speed", self.max_speed),
            ("rated_speed", self.rated_speed),
        ] {
            if require_finite(name, value)? <= 0.0 {
                return Err(ControlError::invalid(name, format!("must be positive, got {value}")));
            }
        }
        for (name, window) in [
            ("tolerance", self.tolerance),
            ("velocity_tolerance", self.velocity_tolerance),
        ] {
            require_finite(name, window.lower)?;
            require_finite(name, window.upper)?;
            if window.lower > window.upper {
                return Err(ControlError::invalid(name, "lower bound exceeds upper bound"));
            }
        }
        if let Some(decay) = self.reversal_cooldown {
            if require_finite("reversal_cooldown", decay)? < 0.0 {
                return Err(ControlError::invalid("reversal_cooldown", "must not be negative"));
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveState {
    Idle,
    Planning,
    Tracking,
    Settled,
    /// Fail-safe: every actuator stopped, not finished.
    Halted,
}

impl fmt::Display for DriveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriveState::Idle => "idle",
            DriveState::Planning => "planning",
            DriveState::Tracking => "tracking",
            DriveState::Settled => "settled",
            DriveState::Halted => "halted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
enum Task {
    Positional(MotionPlan),
    Velocity(VelocityInput),
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

/// Drivetrain motion controller.
///
/// One controller serves every drivetrain motion: straight moves, curves,
/// position holds and velocity feeds.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
/// use krypton_control::drive::{DriveController, DriveControllerConfig, DriveState};
/// use krypton_hal::sim::SimRobot;
/// use krypton_types::MotionRequest;
///
/// let (registry, _probes) = SimRobot::new().with_tank_drive(10_000.0).build();
/// let hw = Arc::new(Mutex::new(registry));
/// let mut drive = DriveController::new(Arc::clone(&hw), DriveControllerConfig::default()).unwrap();
///
/// drive.initialize(MotionRequest::RelativeDistance { inches: 12.0 }).unwrap();
/// for _ in 0..500 {
///     hw.lock().unwrap().refresh(Duration::from_millis(20));
///     drive.execute();
///     if drive.is_finished() {
///         break;
///     }
/// }
/// assert_eq!(drive.state(), DriveState::Settled);
/// drive.end(false);
/// ```
pub struct DriveController<H: ActuatorInterface> {
    hw: H,
    config: DriveControllerConfig,
    planner: PositionTargetPlanner,
    limiter: RatioClampedSpeedLimiter,
    state: DriveState,
    mode: ControlMode,
    task: Option<Task>,
    untrusted: Vec<bool>,
    cooldown: Option<ReversalCooldown>,
    last_outputs: Option<(ControlMode, Vec<f64>)>,
    fault: Option<ControlError>,
}

impl<H: ActuatorInterface> DriveController<H> {
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when `config` is invalid.
    pub fn new(hw: H, config: DriveControllerConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let planner = PositionTargetPlanner::new(config.geometry, config.layout.clone())?;
        let limiter = RatioClampedSpeedLimiter::new(config.max_speed)?;
        let n = config.layout.len();
        Ok(Self {
            hw,
            mode: config.mode,
            config,
            planner,
            limiter,
            state: DriveState::Idle,
            task: None,
            untrusted: vec![false; n],
            cooldown: None,
            last_outputs: None,
            fault: None,
        })
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    /// Mode currently in effect; differs from the configured mode after a
    /// sensor-loss fallback.
    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn config(&self) -> &DriveControllerConfig {
        &self.config
    }

    pub fn plan(&self) -> Option<&MotionPlan> {
        match &self.task {
            Some(Task::Positional(plan)) => Some(plan),
            _ => None,
        }
    }

    /// The error that sent the controller to [`DriveState::Halted`].
    pub fn fault(&self) -> Option<&ControlError> {
        self.fault.as_ref()
    }

    /// Ids of actuators latched as untrusted since the last `initialize`.
    pub fn untrusted_actuators(&self) -> Vec<&str> {
        self.config
            .layout
            .iter()
            .zip(&self.untrusted)
            .filter(|(_, untrusted)| **untrusted)
            .map(|(track, _)| track.id.as_str())
            .collect()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn is_finished(&self) -> bool {
        self.state == DriveState::Settled
    }

    /// Start a motion.
    ///
    /// Distance and rotation requests are planned against the current encoder
    /// readings; a request that moves nothing completes immediately.
    /// [`MotionRequest::AbsoluteVelocity`] starts a velocity feed updated
    /// through [`set_velocity_input`][Self::set_velocity_input].
    ///
    /// # Errors
    ///
    /// - [`ControlError::InvalidArgument`] for aiming requests or bad
    ///   parameters; the controller stays idle.
    /// - [`ControlError::HardwareFault`] when the actuators cannot be read or
    ///   commanded; the controller halts.
    pub fn initialize(&mut self, request: MotionRequest) -> Result<(), ControlError> {
        if self.state != DriveState::Idle {
            debug!(state = %self.state, "re-initializing active drive controller");
            self.end(true);
        }
        self.fault = None;
        self.task = None;
        self.mode = self.config.mode;
        self.untrusted = vec![false; self.config.layout.len()];
        self.cooldown = self.config.reversal_cooldown.map(ReversalCooldown::new);
        self.last_outputs = None;

        match request {
            MotionRequest::AbsoluteVelocity {
                strafe,
                forward,
                rotate,
            } => {
                let input = VelocityInput::new(strafe, forward, rotate)?;
                if self.mode == ControlMode::ClosedLoopPosition {
                    self.mode = ControlMode::ClosedLoopVelocity;
                }
                self.task = Some(Task::Velocity(input));
                self.state = DriveState::Tracking;
                info!(mode = %self.mode, ?input, "velocity feed started");
                Ok(())
            }
            MotionRequest::AngularError { .. } => Err(ControlError::invalid(
                "request",
                "angular errors are handled by the aim controller",
            )),
            MotionRequest::RelativeDistance { .. } | MotionRequest::RelativeRotation { .. } => {
                self.start_positional(&request)
            }
        }
    }

    fn start_positional(&mut self, request: &MotionRequest) -> Result<(), ControlError> {
        self.state = DriveState::Planning;
        let start = match self.snapshot() {
            Ok(start) => start,
            Err(e) => {
                self.halt(e.clone());
                return Err(e);
            }
        };

        let plan = match self.planner.plan(request, &start) {
            Ok(plan) => plan,
            Err(ControlError::DegenerateRequest(reason)) => {
                info!(%reason, "nothing to move; settling immediately");
                self.settle();
                return Ok(());
            }
            Err(e) => {
                self.state = DriveState::Idle;
                return Err(e);
            }
        };

        for (i, state) in start.iter().enumerate() {
            if !state.encoder_trusted {
                self.mark_untrusted(i);
            }
        }

        if self.mode == ControlMode::ClosedLoopPosition {
            let sent = self
                .config
                .layout
                .iter()
                .zip(&plan.targets)
                .try_for_each(|(track, &target)| self.hw.set_position_command(&track.id, target));
            if let Err(e) = sent {
                self.halt(e.clone());
                return Err(e);
            }
        }

        info!(?request, mode = %self.mode, targets = ?plan.targets, "drive move started");
        self.task = Some(Task::Positional(plan));
        self.state = DriveState::Tracking;
        Ok(())
    }

    /// Replace the velocity-feed input used from the next `execute`.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when the controller is not running
    /// a velocity feed.
    pub fn set_velocity_input(&mut self, input: VelocityInput) -> Result<(), ControlError> {
        for (name, value) in ["strafe", "forward", "rotate"].iter().zip(input.components()) {
            require_finite(name, value)?;
        }
        match (&mut self.task, self.state) {
            (Some(Task::Velocity(current)), DriveState::Tracking) => {
                *current = input;
                Ok(())
            }
            _ => Err(ControlError::invalid(
                "velocity_input",
                "controller is not running a velocity feed",
            )),
        }
    }

    /// Run one control cycle.  Does nothing outside [`DriveState::Tracking`].
    pub fn execute(&mut self) {
        if self.state != DriveState::Tracking {
            return;
        }

        for i in 0..self.config.layout.len() {
            if !self.untrusted[i] && !self.hw.is_encoder_trusted(&self.config.layout[i].id) {
                self.mark_untrusted(i);
            }
        }

        let Some(task) = self.task.take() else {
            return;
        };
        let result = match &task {
            Task::Positional(plan) => self.track_position(plan),
            Task::Velocity(input) => self.track_velocity(*input),
        };
        self.task = Some(task);

        if let Err(e) = result {
            self.halt(e);
        }
    }

    /// Stop every actuator and return to [`DriveState::Idle`].
    pub fn end(&mut self, interrupted: bool) {
        let from = self.state;
        self.stop_all();
        self.state = DriveState::Idle;
        self.task = None;
        self.last_outputs = None;
        if interrupted {
            info!(from = %from, "drive interrupted");
        } else {
            debug!(from = %from, "drive ended");
        }
    }

    // ── per-cycle work ──────────────────────────────────────────────────────

    fn track_position(&mut self, plan: &MotionPlan) -> Result<(), ControlError> {
        let n = plan.len();
        let mut errors: Vec<Option<f64>> = vec![None; n];
        for (i, track) in self.config.layout.iter().enumerate() {
            if !self.untrusted[i] {
                let position = self.hw.position(&track.id)?;
                errors[i] = Some(plan.targets[i].saturating_sub(position) as f64);
            }
        }

        let reference = (0..n)
            .filter(|&i| errors[i].is_some() && plan.speed_ratio[i] != 0.0)
            .max_by(|&a, &b| {
                plan.speed_ratio[a]
                    .abs()
                    .total_cmp(&plan.speed_ratio[b].abs())
            });
        if reference.is_none() {
            if let Some(i) = (0..n).find(|&i| errors[i].is_none() && plan.speed_ratio[i] != 0.0) {
                return Err(ControlError::SensorFault {
                    actuator: self.config.layout[i].id.clone(),
                });
            }
        }

        if errors
            .iter()
            .flatten()
            .all(|e| self.config.tolerance.contains(*e))
        {
            self.settle();
            return Ok(());
        }

        if self.mode == ControlMode::ClosedLoopPosition {
            // The motor controllers are holding the targets sent at initialize.
            return Ok(());
        }

        let mut commands: Vec<f64> = errors
            .iter()
            .map(|e| e.map_or(0.0, |e| self.config.gain * e))
            .collect();
        if let Some(r) = reference {
            // Robot-frame command per unit of planned ratio.
            let per_ratio =
                commands[r] * self.config.layout[r].polarity.sign() / plan.speed_ratio[r];
            for (i, track) in self.config.layout.iter().enumerate() {
                if errors[i].is_none() {
                    commands[i] = track.polarity.sign() * plan.speed_ratio[i] * per_ratio;
                }
            }
        }
        self.limiter.limit_in_place(&mut commands)?;

        let max = self.limiter.max();
        let percent_limit = self.config.open_loop_percent_limit();
        for (track, &command) in self.config.layout.iter().zip(&commands) {
            match self.mode {
                ControlMode::ClosedLoopVelocity => {
                    self.hw.set_velocity_command(&track.id, command)?;
                }
                ControlMode::OpenLoopPercent => {
                    let percent = (command / max * percent_limit).clamp(-1.0, 1.0);
                    self.hw.set_percent_output(&track.id, percent)?;
                }
                ControlMode::ClosedLoopPosition => {}
            }
        }
        Ok(())
    }

    fn track_velocity(&mut self, input: VelocityInput) -> Result<(), ControlError> {
        if self.config.finish_velocity_within_tolerance
            && input
                .components()
                .iter()
                .all(|c| self.config.velocity_tolerance.contains(*c))
        {
            self.settle();
            return Ok(());
        }

        let mut input = input;
        if let Some(cooldown) = self.cooldown.as_mut() {
            input.forward = cooldown.apply(input.forward);
        }

        let scale = match self.mode {
            ControlMode::OpenLoopPercent => self.config.open_loop_percent_limit(),
            _ => self.limiter.max(),
        };
        let outputs: Vec<f64> = mix(&self.config.layout, &input)?
            .into_iter()
            .map(|v| v * scale)
            .collect();

        if self
            .last_outputs
            .as_ref()
            .is_some_and(|(mode, last)| *mode == self.mode && *last == outputs)
        {
            return Ok(());
        }

        for (track, &output) in self.config.layout.iter().zip(&outputs) {
            match self.mode {
                ControlMode::OpenLoopPercent => self.hw.set_percent_output(&track.id, output)?,
                _ => self.hw.set_velocity_command(&track.id, output)?,
            }
        }
        self.last_outputs = Some((self.mode, outputs));
        Ok(())
    }

    // ── transitions ─────────────────────────────────────────────────────────

    fn snapshot(&self) -> Result<Vec<ActuatorState>, ControlError> {
        self.config
            .layout
            .iter()
            .map(|track| self.hw.state(&track.id))
            .collect()
    }

    fn mark_untrusted(&mut self, i: usize) {
        if self.untrusted[i] {
            return;
        }
        self.untrusted[i] = true;
        let fault = ControlError::SensorFault {
            actuator: self.config.layout[i].id.clone(),
        };
        warn!(error = %fault, "encoder untrusted until next initialize");
        if self.mode != ControlMode::OpenLoopPercent {
            info!(from = %self.mode, "drive group switching to open loop");
            self.mode = ControlMode::OpenLoopPercent;
            self.last_outputs = None;
        }
    }

    fn settle(&mut self) {
        self.stop_all();
        self.state = DriveState::Settled;
        info!("drive settled");
    }

    fn halt(&mut self, fault: ControlError) {
        error!(error = %fault, "drive halted; all actuators stopped");
        self.stop_all();
        self.state = DriveState::Halted;
        self.fault = Some(fault);
    }

    fn stop_all(&mut self) {
        for track in &self.config.layout {
            if let Err(e) = self.hw.stop(&track.id) {
                warn!(actuator = %track.id, error = %e, "stop failed");
            }
        }
    }
}

impl<H: ActuatorInterface> Drop for DriveController<H> {
    fn drop(&mut self) {
        if self.state != DriveState::Idle {
            self.end(true);
        }
    }
}

//! [`AimController`] – vision-guided turret and hood aiming.
//!
//! Each cycle the controller reads the camera offset on its axis, adds the
//! operator trim and packs both with the target distance into a
//! [`MotionRequest::AngularError`].  [`AimConfig::compensated_error`]
//! subtracts the distance-dependent correction, and the result goes through a
//! [`PidController`] clamped to `±max_slew`:
//!
//! | Axis | Offset | Typical actuator |
//! |---|---|---|
//! | [`AimAxis::Yaw`] | `angular_offset` | turret |
//! | [`AimAxis::Elevation`] | `vertical_offset` | hood |
//!
//! The camera pipeline selected at `initialize` is put back at `end`.

use std::fmt;
use std::time::Duration;

use krypton_hal::{ActuatorInterface, IndicatorInterface, PidController, VisionInterface};
use krypton_types::{ControlError, MotionRequest, Polarity, require_finite};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AimAxis {
    Yaw,
    Elevation,
}

/// Linear correction applied beyond the distance threshold:
/// `error − (intercept + slope · (distance − threshold))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceCompensation {
    pub intercept: f64,
    pub slope: f64,
}

/// Inclusive travel range of an aim actuator, in encoder ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLimits {
    pub min_ticks: i64,
    pub max_ticks: i64,
}

impl SoftLimits {
    /// `false` when `output` would push further past a limit.
    pub fn allows(&self, position: i64, output: f64) -> bool {
        !((output > 0.0 && position >= self.max_ticks) || (output < 0.0 && position <= self.min_ticks))
    }
}

/// Aim controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AimConfig {
    pub actuator: String,
    pub axis: AimAxis,
    /// Proportional gain, percent output per degree.
    pub gain: f64,
    pub ki: f64,
    pub kd: f64,
    /// Output clamp, in percent.
    pub max_slew: f64,
    /// Degrees.
    pub on_target_threshold: f64,
    pub tracking_pipeline: u32,
    pub distance_threshold_inches: f64,
    pub distance_compensation: Option<DistanceCompensation>,
    pub soft_limits: Option<SoftLimits>,
    pub finish_on_target: bool,
    /// Status light driven with the on-target flag.
    pub indicator: Option<String>,
    pub polarity: Polarity,
}

impl Default for AimConfig {
    fn default() -> Self {
        Self::turret()
    }
}

impl AimConfig {
    /// Turret tracking: runs until ended.
    pub fn turret() -> Self {
        Self {
            actuator: "turret".to_string(),
            axis: AimAxis::Yaw,
            gain: 0.03,
            ki: 0.0,
            kd: 0.0,
            max_slew: 0.3,
            on_target_threshold: 1.0,
            tracking_pipeline: 0,
            distance_threshold_inches: 180.0,
            distance_compensation: None,
            soft_limits: None,
            finish_on_target: false,
            indicator: Some("on_target".to_string()),
            polarity: Polarity::Normal,
        }
    }

    /// Hood elevation: finishes once on target and never leaves its travel
    /// range.
    pub fn hood() -> Self {
        Self {
            actuator: "hood".to_string(),
            axis: AimAxis::Elevation,
            soft_limits: Some(SoftLimits {
                min_ticks: 0,
                max_ticks: 6_000,
            }),
            // Long shots drop: aim 1° high at the threshold, plus 0.02° per
            // inch beyond it.
            distance_compensation: Some(DistanceCompensation {
                intercept: 1.0,
                slope: 0.02,
            }),
            finish_on_target: true,
            ..Self::turret()
        }
    }

    /// Degrees to drive toward zero for an [`MotionRequest::AngularError`]:
    /// the raw error, less the distance correction once the target is
    /// farther than `distance_threshold_inches`.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] for any other request kind or a
    /// non-finite error.
    pub fn compensated_error(&self, request: &MotionRequest) -> Result<f64, ControlError> {
        let MotionRequest::AngularError {
            degrees,
            distance_inches,
        } = *request
        else {
            return Err(ControlError::invalid(
                "request",
                "aiming follows angular errors only",
            ));
        };
        let mut error = require_finite("degrees", degrees)?;
        if let (Some(comp), Some(distance)) = (self.distance_compensation, distance_inches) {
            if distance > self.distance_threshold_inches {
                error -= comp.intercept + comp.slope * (distance - self.distance_threshold_inches);
            }
        }
        Ok(error)
    }

    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.actuator.is_empty() {
            return Err(ControlError::invalid("actuator", "must not be empty"));
        }
        for (name, value) in [
            ("gain", self.gain),
            ("ki", self.ki),
            ("kd", self.kd),
            ("distance_threshold_inches", self.distance_threshold_inches),
        ] {
            require_finite(name, value)?;
        }
        for (name, value) in [
            ("max_slew", self.max_slew),
            ("on_target_threshold", self.on_target_threshold),
        ] {
            if require_finite(name, value)? < 0.0 {
                return Err(ControlError::invalid(name, "must not be negative"));
            }
        }
        if self.max_slew > 1.0 {
            return Err(ControlError::invalid("max_slew", "percent output cannot exceed 1"));
        }
        if let Some(comp) = self.distance_compensation {
            require_finite("distance_compensation.intercept", comp.intercept)?;
            require_finite("distance_compensation.slope", comp.slope)?;
        }
        if let Some(limits) = self.soft_limits {
            if limits.min_ticks > limits.max_ticks {
                return Err(ControlError::invalid("soft_limits", "min_ticks exceeds max_ticks"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AimState {
    Idle,
    Tracking,
    Halted,
}

impl fmt::Display for AimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AimState::Idle => write!(f, "idle"),
            AimState::Tracking => write!(f, "tracking"),
            AimState::Halted => write!(f, "halted"),
        }
    }
}

/// Vision-guided aiming of one actuator.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
/// use krypton_control::aim::{AimConfig, AimController};
/// use krypton_hal::sim::{SimRobot, SimTarget};
///
/// let (registry, probes) = SimRobot::new().with_turret(5_000.0, 100.0).with_vision().build();
/// let hw = Arc::new(Mutex::new(registry));
/// let period = Duration::from_millis(20);
/// let mut aim = AimController::new(Arc::clone(&hw), AimConfig::turret(), period).unwrap();
///
/// probes.vision().unwrap().set_target(Some(SimTarget {
///     bearing: 20.0,
///     elevation: 0.0,
///     distance: None,
/// }));
/// aim.initialize().unwrap();
/// for _ in 0..200 {
///     hw.lock().unwrap().refresh(period);
///     aim.execute();
/// }
/// assert!(aim.on_target());
/// aim.end(false);
/// ```
pub struct AimController<H: ActuatorInterface + VisionInterface + IndicatorInterface> {
    hw: H,
    config: AimConfig,
    period: Duration,
    pid: PidController,
    state: AimState,
    adjustment: f64,
    on_target: bool,
    saved_pipeline: Option<u32>,
    last_request: Option<MotionRequest>,
    last_output: Option<f64>,
    indicator_warned: bool,
    fault: Option<ControlError>,
}

impl<H> AimController<H>
where
    H: ActuatorInterface + VisionInterface + IndicatorInterface,
{
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] for an invalid config or a zero
    /// period.
    pub fn new(hw: H, config: AimConfig, period: Duration) -> Result<Self, ControlError> {
        config.validate()?;
        if period.is_zero() {
            return Err(ControlError::invalid("period", "must be positive"));
        }
        let pid = PidController::new(config.gain, config.ki, config.kd)
            .with_output_limits(-config.max_slew, config.max_slew);
        Ok(Self {
            hw,
            config,
            period,
            pid,
            state: AimState::Idle,
            adjustment: 0.0,
            on_target: false,
            saved_pipeline: None,
            last_request: None,
            last_output: None,
            indicator_warned: false,
            fault: None,
        })
    }

    pub fn state(&self) -> AimState {
        self.state
    }

    pub fn config(&self) -> &AimConfig {
        &self.config
    }

    pub fn on_target(&self) -> bool {
        self.on_target
    }

    pub fn fault(&self) -> Option<&ControlError> {
        self.fault.as_ref()
    }

    /// The angular error built from the camera on the latest cycle with a
    /// target.
    pub fn last_request(&self) -> Option<MotionRequest> {
        self.last_request
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// Operator trim in degrees, added to every vision offset.  Survives
    /// `end` so the trim carries over to the next run.
    pub fn adjustment(&self) -> f64 {
        self.adjustment
    }

    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] for a non-finite value.
    pub fn set_adjustment(&mut self, degrees: f64) -> Result<(), ControlError> {
        self.adjustment = require_finite("adjustment", degrees)?;
        info!(actuator = %self.config.actuator, adjustment = self.adjustment, "aim trim set");
        Ok(())
    }

    /// Nudge the trim by `delta` degrees.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] for a non-finite result.
    pub fn adjust(&mut self, delta: f64) -> Result<(), ControlError> {
        self.set_adjustment(self.adjustment + require_finite("delta", delta)?)
    }

    pub fn is_finished(&self) -> bool {
        self.config.finish_on_target && self.on_target
    }

    /// Select the tracking pipeline and start aiming.
    ///
    /// # Errors
    ///
    /// [`ControlError::HardwareFault`] when the camera rejects the pipeline;
    /// the controller halts.
    pub fn initialize(&mut self) -> Result<(), ControlError> {
        if self.state != AimState::Idle {
            self.end(true);
        }
        self.fault = None;
        self.on_target = false;
        self.last_request = None;
        self.last_output = None;
        self.pid.reset();

        self.saved_pipeline = Some(self.hw.pipeline());
        if let Err(e) = self.hw.set_pipeline(self.config.tracking_pipeline) {
            self.halt(e.clone());
            return Err(e);
        }
        self.write_indicator(false);
        self.state = AimState::Tracking;
        info!(
            actuator = %self.config.actuator,
            axis = ?self.config.axis,
            pipeline = self.config.tracking_pipeline,
            "aiming started"
        );
        Ok(())
    }

    /// Run one control cycle.  Does nothing outside [`AimState::Tracking`].
    pub fn execute(&mut self) {
        if self.state != AimState::Tracking {
            return;
        }
        if let Err(e) = self.track() {
            self.halt(e);
        }
    }

    /// Stop the actuator, restore the camera pipeline and clear the light.
    pub fn end(&mut self, interrupted: bool) {
        let from = self.state;
        if let Err(e) = self.hw.stop(&self.config.actuator) {
            warn!(actuator = %self.config.actuator, error = %e, "stop failed");
        }
        if let Some(pipeline) = self.saved_pipeline.take() {
            if let Err(e) = self.hw.set_pipeline(pipeline) {
                warn!(pipeline, error = %e, "pipeline restore failed");
            }
        }
        self.on_target = false;
        self.write_indicator(false);
        self.last_request = None;
        self.last_output = None;
        self.state = AimState::Idle;
        debug!(actuator = %self.config.actuator, from = %from, interrupted, "aiming ended");
    }

    fn track(&mut self) -> Result<(), ControlError> {
        let actuator = self.config.actuator.as_str();
        if !self.hw.has_target() {
            self.on_target = false;
            if self.last_output != Some(0.0) {
                self.hw.stop(actuator)?;
                self.last_output = Some(0.0);
                debug!(actuator, "no target; holding");
            }
            self.write_indicator(false);
            return Ok(());
        }

        let offset = match self.config.axis {
            AimAxis::Yaw => self.hw.angular_offset(),
            AimAxis::Elevation => self.hw.vertical_offset(),
        };
        let request = MotionRequest::AngularError {
            degrees: offset + self.adjustment,
            distance_inches: self.hw.distance(),
        };
        let error = self.config.compensated_error(&request)?;
        self.last_request = Some(request);
        self.on_target = error.abs() <= self.config.on_target_threshold;

        let mut output =
            self.pid.update_error(error, self.period.as_secs_f64()) * self.config.polarity.sign();
        if let Some(limits) = self.config.soft_limits {
            if !self.hw.is_encoder_trusted(actuator) {
                // Position unknown: cannot tell which way is safe.
                output = 0.0;
            } else if !limits.allows(self.hw.position(actuator)?, output) {
                output = 0.0;
            }
        }

        self.hw.set_percent_output(actuator, output)?;
        self.last_output = Some(output);
        let on_target = self.on_target;
        self.write_indicator(on_target);
        Ok(())
    }

    fn write_indicator(&mut self, on: bool) {
        let Some(id) = self.config.indicator.as_deref() else {
            return;
        };
        if let Err(e) = self.hw.set_indicator(id, on) {
            if !self.indicator_warned {
                warn!(indicator = id, error = %e, "status light unavailable");
                self.indicator_warned = true;
            }
        }
    }

    fn halt(&mut self, fault: ControlError) {
        error!(actuator = %self.config.actuator, error = %fault, "aiming halted");
        if let Err(e) = self.hw.stop(&self.config.actuator) {
            warn!(actuator = %self.config.actuator, error = %e, "stop failed");
        }
        self.on_target = false;
        self.state = AimState::Halted;
        self.fault = Some(fault);
    }
}

impl<H> Drop for AimController<H>
where
    H: ActuatorInterface + VisionInterface + IndicatorInterface,
{
    fn drop(&mut self) {
        if self.state != AimState::Idle {
            self.end(true);
        }
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Observed state of one physical drive or aim actuator.
///
/// Produced by the hardware layer every control cycle.  The control core only
/// reads it; it never owns or mutates the underlying device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorState {
    /// Stable identifier, e.g. `"drive_left"` or `"turret"`.
    pub id: String,
    /// Encoder position in ticks.
    pub position: i64,
    /// Encoder velocity in ticks per second.
    pub velocity: f64,
    /// `false` when the encoder is disconnected or reporting stale data.
    pub encoder_trusted: bool,
}

/// A high-level motion target, created once when a motion command starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionRequest {
    /// Drive straight for `inches` (negative drives backwards).
    RelativeDistance { inches: f64 },
    /// Turn `degrees` about a point `radius_inches` from the robot centre.
    RelativeRotation { degrees: f64, radius_inches: f64 },
    /// Externally supplied velocity feed in normalised units (`[-1, 1]`).
    AbsoluteVelocity {
        strafe: f64,
        forward: f64,
        rotate: f64,
    },
    /// Vision-derived aiming error.
    AngularError {
        degrees: f64,
        distance_inches: Option<f64>,
    },
}

impl MotionRequest {
    /// `true` for requests that resolve into per-actuator encoder targets.
    pub fn is_positional(&self) -> bool {
        matches!(
            self,
            MotionRequest::RelativeDistance { .. } | MotionRequest::RelativeRotation { .. }
        )
    }
}

/// Per-actuator encoder targets derived from a [`MotionRequest`].
///
/// `speed_ratio[i]` is actuator `i`'s planned travel divided by the travel of
/// the dominant (largest-travel) actuator, so the dominant entry is `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPlan {
    /// Absolute target position for each actuator, in raw encoder ticks.
    pub targets: Vec<i64>,
    /// Signed travel of each actuator in the robot frame (forward positive).
    pub travel_ticks: Vec<f64>,
    pub speed_ratio: Vec<f64>,
}

impl MotionPlan {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// How an actuator group is currently driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Raw voltage fraction with no feedback.
    OpenLoopPercent,
    /// Velocity setpoints tracked by the motor controller.
    #[default]
    ClosedLoopVelocity,
    /// Position setpoints held by the motor controller's PID profile.
    ClosedLoopPosition,
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMode::OpenLoopPercent => write!(f, "open_loop_percent"),
            ControlMode::ClosedLoopVelocity => write!(f, "closed_loop_velocity"),
            ControlMode::ClosedLoopPosition => write!(f, "closed_loop_position"),
        }
    }
}

/// Inclusive error range within which a motion axis counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceWindow {
    pub lower: f64,
    pub upper: f64,
}

impl ToleranceWindow {
    /// A window of `±half_width` around zero.
    pub const fn symmetric(half_width: f64) -> Self {
        Self {
            lower: -half_width,
            upper: half_width,
        }
    }

    /// `true` when `value` lies inside the window.  NaN is never inside.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Which way an encoder counts relative to the robot's forward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Normal,
    /// Counts decrease when the wheel drives the robot forward.
    Inverted,
}

impl Polarity {
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Normal => 1.0,
            Polarity::Inverted => -1.0,
        }
    }
}

/// Side of a differential drivetrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Where a drive actuator sits on the chassis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mount {
    Left,
    Right,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Mount {
    pub fn side(self) -> Side {
        match self {
            Mount::Left | Mount::FrontLeft | Mount::BackLeft => Side::Left,
            Mount::Right | Mount::FrontRight | Mount::BackRight => Side::Right,
        }
    }
}

/// Static description of one drive actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub id: String,
    pub mount: Mount,
    #[serde(default)]
    pub polarity: Polarity,
}

impl TrackConfig {
    pub fn new(id: impl Into<String>, mount: Mount, polarity: Polarity) -> Self {
        Self {
            id: id.into(),
            mount,
            polarity,
        }
    }
}

/// The last setpoint a driver accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum ActuatorCommand {
    Percent(f64),
    Velocity(f64),
    Position(i64),
    Stop,
}

/// Error type shared by every Krypton crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlError {
    #[error("Invalid argument `{name}`: {details}")]
    InvalidArgument { name: String, details: String },

    #[error("Degenerate motion request: {0}")]
    DegenerateRequest(String),

    #[error("Sensor fault on {actuator}: encoder reports untrusted")]
    SensorFault { actuator: String },

    #[error("Resource conflict: `{resource}` is held by `{holder}`")]
    ResourceConflict { resource: String, holder: String },

    #[error("Hardware fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ControlError {
    pub fn invalid(name: impl Into<String>, details: impl Into<String>) -> Self {
        ControlError::InvalidArgument {
            name: name.into(),
            details: details.into(),
        }
    }

    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        ControlError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }
}

/// Return `value` unchanged, or [`ControlError::InvalidArgument`] when it is
/// NaN or infinite.
pub fn require_finite(name: &str, value: f64) -> Result<f64, ControlError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ControlError::invalid(name, format!("must be finite, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_request_serializes_with_kind_tag() {
        let request = MotionRequest::RelativeRotation {
            degrees: 90.0,
            radius_inches: 12.0,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"kind\":\"relative_rotation\""));
        let back: MotionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn only_distance_and_rotation_are_positional() {
        assert!(MotionRequest::RelativeDistance { inches: 1.0 }.is_positional());
        assert!(
            MotionRequest::RelativeRotation {
                degrees: 1.0,
                radius_inches: 0.0
            }
            .is_positional()
        );
        assert!(
            !MotionRequest::AbsoluteVelocity {
                strafe: 0.0,
                forward: 1.0,
                rotate: 0.0
            }
            .is_positional()
        );
        assert!(
            !MotionRequest::AngularError {
                degrees: 3.0,
                distance_inches: None
            }
            .is_positional()
        );
    }

    #[test]
    fn tolerance_window_is_inclusive() {
        let window = ToleranceWindow::symmetric(50.0);
        assert!(window.contains(50.0));
        assert!(window.contains(-50.0));
        assert!(window.contains(0.0));
        assert!(!window.contains(50.5));
        assert!(!window.contains(-51.0));
    }

    #[test]
    fn tolerance_window_rejects_nan() {
        assert!(!ToleranceWindow::symmetric(1.0).contains(f64::NAN));
    }

    #[test]
    fn mount_maps_to_side() {
        assert_eq!(Mount::FrontLeft.side(), Side::Left);
        assert_eq!(Mount::BackRight.side(), Side::Right);
        assert_eq!(Mount::Left.side(), Side::Left);
    }

    #[test]
    fn polarity_defaults_to_normal_in_track_config() {
        let track: TrackConfig =
            serde_json::from_str(r#"{"id":"drive_right","mount":"right"}"#).unwrap();
        assert_eq!(track.polarity, Polarity::Normal);
        assert_eq!(Polarity::Inverted.sign(), -1.0);
    }

    #[test]
    fn require_finite_rejects_infinity_and_nan() {
        assert_eq!(require_finite("x", 2.5), Ok(2.5));
        assert!(matches!(
            require_finite("x", f64::INFINITY),
            Err(ControlError::InvalidArgument { .. })
        ));
        assert!(matches!(
            require_finite("x", f64::NAN),
            Err(ControlError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn control_error_display() {
        let err = ControlError::ResourceConflict {
            resource: "drivetrain".to_string(),
            holder: "curve".to_string(),
        };
        assert!(err.to_string().contains("drivetrain"));

        let err = ControlError::hardware("turret", "CAN timeout");
        assert!(err.to_string().contains("CAN timeout"));
    }

    #[test]
    fn control_mode_display_matches_serde_names() {
        let json = serde_json::to_string(&ControlMode::OpenLoopPercent).unwrap();
        assert_eq!(json, format!("\"{}\"", ControlMode::OpenLoopPercent));
    }
}

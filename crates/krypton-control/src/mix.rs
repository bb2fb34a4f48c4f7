//! Velocity-feed mixing: `(strafe, forward, rotate)` to per-wheel outputs.
//!
//! Each wheel's share is computed in the robot frame from its
//! [`Mount`] and then mapped to the raw encoder frame through its polarity:
//!
//! | Mount | Robot-frame output |
//! |---|---|
//! | `Left` | `forward + rotate` |
//! | `Right` | `forward − rotate` |
//! | `FrontLeft` | `forward + strafe + rotate` |
//! | `FrontRight` | `forward − strafe − rotate` |
//! | `BackLeft` | `forward − strafe + rotate` |
//! | `BackRight` | `forward + strafe − rotate` |
//!
//! Positive `rotate` turns clockwise, the same direction as a positive
//! [`RelativeRotation`][krypton_types::MotionRequest::RelativeRotation].
//! Tank layouts ignore `strafe`.  When any output exceeds 1 the whole set is
//! scaled down by the [ratio-preserving limiter][crate::limiter].

use krypton_types::{ControlError, Mount, TrackConfig, require_finite};
use serde::{Deserialize, Serialize};

use crate::limiter::RatioClampedSpeedLimiter;

/// One sample of a normalised velocity feed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityInput {
    pub strafe: f64,
    pub forward: f64,
    pub rotate: f64,
}

impl VelocityInput {
    pub const ZERO: Self = Self {
        strafe: 0.0,
        forward: 0.0,
        rotate: 0.0,
    };

    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] naming the first non-finite
    /// component.
    pub fn new(strafe: f64, forward: f64, rotate: f64) -> Result<Self, ControlError> {
        Ok(Self {
            strafe: require_finite("strafe", strafe)?,
            forward: require_finite("forward", forward)?,
            rotate: require_finite("rotate", rotate)?,
        })
    }

    pub fn components(&self) -> [f64; 3] {
        [self.strafe, self.forward, self.rotate]
    }
}

fn robot_frame(mount: Mount, input: &VelocityInput) -> f64 {
    let VelocityInput {
        strafe,
        forward,
        rotate,
    } = *input;
    match mount {
        Mount::Left => forward + rotate,
        Mount::Right => forward - rotate,
        Mount::FrontLeft => forward + strafe + rotate,
        Mount::FrontRight => forward - strafe - rotate,
        Mount::BackLeft => forward - strafe + rotate,
        Mount::BackRight => forward + strafe - rotate,
    }
}

/// Mix `input` into raw per-actuator outputs in `[-1, 1]`, in layout order.
///
/// # Errors
///
/// [`ControlError::InvalidArgument`] when `input` has non-finite components.
///
/// # Example
///
/// ```
/// use krypton_control::mix::{VelocityInput, mix};
/// use krypton_types::{Mount, Polarity, TrackConfig};
///
/// let layout = [
///     TrackConfig::new("drive_left", Mount::Left, Polarity::Inverted),
///     TrackConfig::new("drive_right", Mount::Right, Polarity::Normal),
/// ];
/// let out = mix(&layout, &VelocityInput::new(0.0, 1.0, 1.0).unwrap()).unwrap();
/// // Left would need 2.0, so everything is halved; the left encoder is
/// // inverted.
/// assert_eq!(out, vec![-1.0, 0.0]);
/// ```
pub fn mix(layout: &[TrackConfig], input: &VelocityInput) -> Result<Vec<f64>, ControlError> {
    for (name, value) in ["strafe", "forward", "rotate"].iter().zip(input.components()) {
        require_finite(name, value)?;
    }
    let mut outputs: Vec<f64> = layout
        .iter()
        .map(|track| robot_frame(track.mount, input))
        .collect();
    RatioClampedSpeedLimiter::new(1.0)?.limit_in_place(&mut outputs)?;
    for (out, track) in outputs.iter_mut().zip(layout) {
        *out *= track.polarity.sign();
    }
    Ok(outputs)
}

/// Damps sudden reversals of the forward axis.
///
/// The cooldown remembers the largest recent forward command and lets it decay
/// by `decay` per cycle.  While the remembered value still points the other
/// way, a reversed command is replaced by zero, so the drivetrain coasts
/// through a short pause instead of slamming into reverse.
#[derive(Debug, Clone, PartialEq)]
pub struct ReversalCooldown {
    decay: f64,
    last: Option<f64>,
}

impl ReversalCooldown {
    pub const DEFAULT_DECAY: f64 = 0.05;

    pub fn new(decay: f64) -> Self {
        Self {
            decay: decay.abs(),
            last: None,
        }
    }

    /// Filter one forward command.
    pub fn apply(&mut self, forward: f64) -> f64 {
        let Some(last) = self.last else {
            self.last = Some(forward);
            return forward;
        };
        // Decay toward zero without crossing it.
        let decayed = last.signum() * (last.abs() - self.decay).max(0.0);
        let out = if decayed * forward < 0.0 { 0.0 } else { forward };
        self.last = Some(if out.abs() > decayed.abs() { out } else { decayed });
        out
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for ReversalCooldown {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DECAY)
    }
}

//! Distance, angle and encoder-tick conversions.
//!
//! | Function | Formula |
//! |---|---|
//! | [`to_ticks`] | `distance / (π · diameter) · ticks_per_revolution` |
//! | [`curve_arc_length`] | `angle / 360 · 2π · radius` |
//! | [`DriveGeometry::inches_to_ticks`] | [`to_ticks`] with the gear ratio folded into the tick count |
//!
//! Every conversion rejects non-finite input with
//! [`ControlError::InvalidArgument`].

use std::f64::consts::PI;

use krypton_types::{ControlError, Side, require_finite};
use serde::{Deserialize, Serialize};

/// Convert a linear wheel distance to encoder ticks.
///
/// # Errors
///
/// [`ControlError::InvalidArgument`] for non-finite input or a non-positive
/// diameter or tick count.
///
/// # Example
///
/// ```
/// use krypton_control::units::to_ticks;
///
/// // One full revolution of a 6" wheel on a 2048-tick encoder.
/// let ticks = to_ticks(6.0 * std::f64::consts::PI, 6.0, 2048.0).unwrap();
/// assert!((ticks - 2048.0).abs() < 1e-9);
/// ```
pub fn to_ticks(
    distance_inches: f64,
    wheel_diameter_inches: f64,
    ticks_per_revolution: f64,
) -> Result<f64, ControlError> {
    let distance = require_finite("distance_inches", distance_inches)?;
    let diameter = require_positive("wheel_diameter_inches", wheel_diameter_inches)?;
    let ticks = require_positive("ticks_per_revolution", ticks_per_revolution)?;
    Ok(distance / (PI * diameter) * ticks)
}

/// Length of the arc swept by a point `effective_radius` inches from the
/// centre of rotation while turning `angle_degrees`.
///
/// A negative radius yields a negative length: that point travels backwards.
///
/// # Errors
///
/// [`ControlError::InvalidArgument`] for non-finite input.
pub fn curve_arc_length(angle_degrees: f64, effective_radius: f64) -> Result<f64, ControlError> {
    let angle = require_finite("angle_degrees", angle_degrees)?;
    let radius = require_finite("effective_radius", effective_radius)?;
    Ok(angle / 360.0 * 2.0 * PI * radius)
}

fn require_positive(name: &str, value: f64) -> Result<f64, ControlError> {
    let value = require_finite(name, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ControlError::invalid(name, format!("must be positive, got {value}")))
    }
}

/// Physical drivetrain dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveGeometry {
    pub wheel_diameter_inches: f64,
    /// Encoder ticks per motor revolution.
    pub ticks_per_revolution: f64,
    /// Motor revolutions per wheel revolution.
    pub gear_ratio: f64,
    /// Distance from the robot centre line to each track.
    pub track_half_width_inches: f64,
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            wheel_diameter_inches: 6.0,
            ticks_per_revolution: 2048.0,
            gear_ratio: 10.7,
            track_half_width_inches: 12.0,
        }
    }
}

impl DriveGeometry {
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ControlError> {
        require_positive("wheel_diameter_inches", self.wheel_diameter_inches)?;
        require_positive("ticks_per_revolution", self.ticks_per_revolution)?;
        require_positive("gear_ratio", self.gear_ratio)?;
        let w = require_finite("track_half_width_inches", self.track_half_width_inches)?;
        if w < 0.0 {
            return Err(ControlError::invalid(
                "track_half_width_inches",
                format!("must not be negative, got {w}"),
            ));
        }
        Ok(())
    }

    /// Encoder ticks per wheel revolution.
    pub fn ticks_per_wheel_revolution(&self) -> f64 {
        self.ticks_per_revolution * self.gear_ratio
    }

    /// # Errors
    ///
    /// See [`to_ticks`].
    pub fn inches_to_ticks(&self, inches: f64) -> Result<f64, ControlError> {
        to_ticks(
            inches,
            self.wheel_diameter_inches,
            self.ticks_per_wheel_revolution(),
        )
    }

    /// Inverse of [`inches_to_ticks`][Self::inches_to_ticks].
    ///
    /// # Errors
    ///
    /// See [`to_ticks`].
    pub fn ticks_to_inches(&self, ticks: f64) -> Result<f64, ControlError> {
        let ticks = require_finite("ticks", ticks)?;
        let per_rev = require_positive("ticks_per_revolution", self.ticks_per_wheel_revolution())?;
        let diameter = require_positive("wheel_diameter_inches", self.wheel_diameter_inches)?;
        Ok(ticks / per_rev * PI * diameter)
    }

    /// Turning radius seen by the track on `side` when the robot centre
    /// follows an arc of `radius` inches.  Positive angles turn towards the
    /// right track, so the left track is on the outside.
    pub fn effective_radius(&self, side: Side, radius: f64) -> f64 {
        match side {
            Side::Left => radius + self.track_half_width_inches,
            Side::Right => radius - self.track_half_width_inches,
        }
    }
}

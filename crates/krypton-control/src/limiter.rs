//! Ratio-preserving speed limiting for coupled actuators.
//!
//! When several actuators must move together (both tracks of a curve, four
//! mecanum wheels) clamping each one independently would change the path.
//! [`RatioClampedSpeedLimiter`] scales the whole group by one factor instead,
//! so the largest magnitude lands exactly on the cap and every pairwise ratio
//! is kept.

use krypton_types::{ControlError, require_finite};

/// Group speed cap.
///
/// # Example
///
/// ```
/// use krypton_control::limiter::RatioClampedSpeedLimiter;
///
/// let limiter = RatioClampedSpeedLimiter::new(10_000.0).unwrap();
///
/// let out = limiter.limit(&[20_000.0, -5_000.0]).unwrap();
/// assert_eq!(out, vec![10_000.0, -2_500.0]);
///
/// // Inside the cap nothing changes.
/// assert_eq!(limiter.limit(&[300.0, -40.0]).unwrap(), vec![300.0, -40.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioClampedSpeedLimiter {
    max: f64,
}

impl RatioClampedSpeedLimiter {
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] unless `max` is finite and positive.
    pub fn new(max: f64) -> Result<Self, ControlError> {
        let max = require_finite("max", max)?;
        if max <= 0.0 {
            return Err(ControlError::invalid("max", format!("must be positive, got {max}")));
        }
        Ok(Self { max })
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Scale `values` so that no magnitude exceeds the cap.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when any value is non-finite.
    pub fn limit(&self, values: &[f64]) -> Result<Vec<f64>, ControlError> {
        let mut out = values.to_vec();
        self.limit_in_place(&mut out)?;
        Ok(out)
    }

    /// In-place form of [`limit`][Self::limit].  Returns `true` when the
    /// values were scaled.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] when any value is non-finite; the
    /// slice is left untouched.
    pub fn limit_in_place(&self, values: &mut [f64]) -> Result<bool, ControlError> {
        let mut dominant: Option<(usize, f64)> = None;
        for (i, &v) in values.iter().enumerate() {
            require_finite("values", v)?;
            if dominant.is_none_or(|(_, peak)| v.abs() > peak) {
                dominant = Some((i, v.abs()));
            }
        }

        let Some((k, peak)) = dominant else {
            return Ok(false);
        };
        if peak <= self.max {
            return Ok(false);
        }

        for v in values.iter_mut() {
            *v = (*v / peak * self.max).clamp(-self.max, self.max);
        }
        values[k] = self.max.copysign(values[k]);
        Ok(true)
    }
}

/// Shorthand for a one-off [`RatioClampedSpeedLimiter::limit`].
///
/// # Errors
///
/// [`ControlError::InvalidArgument`] for a bad cap or non-finite values.
pub fn limit(values: &[f64], max: f64) -> Result<Vec<f64>, ControlError> {
    RatioClampedSpeedLimiter::new(max)?.limit(values)
}

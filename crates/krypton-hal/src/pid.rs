//! PID (Proportional–Integral–Derivative) layer under position holds and
//! aiming.
//!
//! The controller is hardware-agnostic: the caller supplies either a
//! measurement (set-point tracking) or a precomputed error (vision offsets,
//! which are already "target minus crosshair") plus the elapsed time, and
//! applies the returned output to whatever actuator it drives.
//!
//! # Example
//!
//! ```rust
//! use krypton_hal::pid::PidController;
//!
//! // Turret aiming: proportional only, output clamped to ±0.3.
//! let mut pid = PidController::new(0.03, 0.0, 0.0).with_output_limits(-0.3, 0.3);
//! let out = pid.update_error(5.0, 0.02);
//! assert!((out - 0.15).abs() < 1e-9);
//!
//! // Large errors saturate at the slew limit.
//! assert_eq!(pid.update_error(40.0, 0.02), 0.3);
//! ```

/// A tunable PID controller for closed-loop feedback control.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    set_point: f64,
    integral: f64,
    /// Errors larger than this (absolute) reset and skip the integrator.
    integral_zone: Option<f64>,
    last_error: Option<f64>,
    output_min: f64,
    output_max: f64,
}

impl PidController {
    /// Create a new controller with the given gains.
    ///
    /// Output is unclamped by default.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            set_point: 0.0,
            integral: 0.0,
            integral_zone: None,
            last_error: None,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }

    /// Builder form of [`set_output_limits`][Self::set_output_limits].
    pub fn with_output_limits(mut self, min: f64, max: f64) -> Self {
        self.set_output_limits(min, max);
        self
    }

    /// Only integrate while `|error| <= zone`.
    pub fn with_integral_zone(mut self, zone: f64) -> Self {
        self.integral_zone = Some(zone.abs());
        self
    }

    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    pub fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    pub fn set_set_point(&mut self, set_point: f64) {
        self.set_point = set_point;
    }

    pub fn set_point(&self) -> f64 {
        self.set_point
    }

    /// Clamp the controller output (and the integral term) to `[min, max]`.
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.output_min = min;
        self.output_max = max;
    }

    /// Compute the next output from a measurement of the process variable.
    ///
    /// Returns `0.0` without touching internal state if `dt` is not positive.
    pub fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        self.update_error(self.set_point - measurement, dt)
    }

    /// Compute the next output from an already computed error.
    ///
    /// Returns `0.0` without touching internal state if `dt` is not positive
    /// or `error` is not finite.
    pub fn update_error(&mut self, error: f64, dt: f64) -> f64 {
        if dt <= 0.0 || !dt.is_finite() || !error.is_finite() {
            return 0.0;
        }

        let p = self.kp * error;

        let i = if self.ki == 0.0 {
            0.0
        } else {
            match self.integral_zone {
                Some(zone) if error.abs() > zone => self.integral = 0.0,
                _ => self.integral += error * dt,
            }
            let i = (self.ki * self.integral).clamp(self.output_min, self.output_max);
            // Back-calculate so the accumulator never winds past the limits.
            self.integral = i / self.ki;
            i
        };

        let d = match self.last_error {
            Some(prev) => self.kd * (error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        (p + i + d).clamp(self.output_min, self.output_max)
    }

    /// Clear the integral accumulator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only_drives_toward_set_point() {
        let mut pid = PidController::new(2.0, 0.0, 0.0);
        pid.set_set_point(10.0);
        let output = pid.update(0.0, 0.1);
        assert!((output - 20.0).abs() < 1e-9);
    }

    #[test]
    fn output_is_zero_at_set_point() {
        let mut pid = PidController::new(1.0, 0.0, 0.0);
        pid.set_set_point(5.0);
        assert!(pid.update(5.0, 0.1).abs() < 1e-12);
    }

    #[test]
    fn slew_limit_is_symmetric() {
        let mut pid = PidController::new(0.03, 0.0, 0.0).with_output_limits(-0.3, 0.3);
        assert_eq!(pid.update_error(100.0, 0.02), 0.3);
        assert_eq!(pid.update_error(-100.0, 0.02), -0.3);
        assert!((pid.update_error(-2.0, 0.02) + 0.06).abs() < 1e-12);
    }

    #[test]
    fn swapped_limits_are_normalised() {
        let pid = PidController::new(1.0, 0.0, 0.0).with_output_limits(1.0, -1.0);
        assert_eq!(pid.output_min, -1.0);
        assert_eq!(pid.output_max, 1.0);
    }

    #[test]
    fn integral_accumulates_over_time() {
        let mut pid = PidController::new(0.0, 1.0, 0.0);
        pid.set_set_point(2.0);
        pid.update(1.0, 0.5);
        let out = pid.update(1.0, 0.5);
        assert!((out - 1.0).abs() < 1e-9);
    }

    #[test]
    fn integral_zone_resets_on_large_error() {
        let mut pid = PidController::new(0.0, 1.0, 0.0).with_integral_zone(30.0);
        pid.update_error(10.0, 1.0);
        assert!((pid.update_error(10.0, 1.0) - 20.0).abs() < 1e-9);
        // Outside the zone the accumulator is dropped.
        assert_eq!(pid.update_error(500.0, 1.0), 0.0);
        assert!((pid.update_error(5.0, 1.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn derivative_reacts_to_error_change() {
        let mut pid = PidController::new(0.0, 0.0, 1.0);
        assert_eq!(pid.update_error(1.0, 0.5), 0.0);
        assert!((pid.update_error(2.0, 0.5) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_state() {
        let mut pid = PidController::new(1.0, 1.0, 1.0);
        pid.set_set_point(5.0);
        pid.update(0.0, 0.1);
        pid.reset();

        let mut fresh = PidController::new(1.0, 1.0, 1.0);
        fresh.set_set_point(5.0);
        assert!((pid.update(0.0, 0.1) - fresh.update(0.0, 0.1)).abs() < 1e-12);
    }

    #[test]
    fn invalid_inputs_return_zero_without_side_effects() {
        let mut pid = PidController::new(1.0, 1.0, 1.0);
        pid.set_set_point(5.0);
        assert_eq!(pid.update(0.0, 0.0), 0.0);
        assert_eq!(pid.update(0.0, -0.1), 0.0);
        assert_eq!(pid.update_error(f64::NAN, 0.1), 0.0);

        let mut fresh = PidController::new(1.0, 1.0, 1.0);
        fresh.set_set_point(5.0);
        assert!((pid.update(0.0, 0.1) - fresh.update(0.0, 0.1)).abs() < 1e-12);
    }
}

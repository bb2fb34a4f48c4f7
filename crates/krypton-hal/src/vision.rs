//! Vision sensor interface.
//!
//! Vision processing itself happens off-board; the control core only reads the
//! resulting offsets and selects which processing pipeline the camera runs.

use std::sync::{Arc, Mutex};

use krypton_types::ControlError;

use crate::lock_handle;

/// A targeting camera.
pub trait VisionInterface: Send {
    /// Horizontal offset from the crosshair to the target, in degrees.
    fn angular_offset(&self) -> f64;

    /// Vertical offset from the crosshair to the target, in degrees.
    fn vertical_offset(&self) -> f64;

    /// Estimated distance to the target in inches, when the pipeline reports
    /// one.
    fn distance(&self) -> Option<f64>;

    fn has_target(&self) -> bool;

    /// Index of the pipeline the camera is currently running.
    fn pipeline(&self) -> u32;

    /// Switch the camera to pipeline `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::HardwareFault`] if the camera rejects the
    /// change or is not connected.
    fn set_pipeline(&mut self, index: u32) -> Result<(), ControlError>;
}

impl<T: VisionInterface + ?Sized> VisionInterface for Arc<Mutex<T>> {
    fn angular_offset(&self) -> f64 {
        lock_handle(&**self, "vision")
            .map(|v| v.angular_offset())
            .unwrap_or(0.0)
    }

    fn vertical_offset(&self) -> f64 {
        lock_handle(&**self, "vision")
            .map(|v| v.vertical_offset())
            .unwrap_or(0.0)
    }

    fn distance(&self) -> Option<f64> {
        lock_handle(&**self, "vision").ok()?.distance()
    }

    fn has_target(&self) -> bool {
        lock_handle(&**self, "vision")
            .map(|v| v.has_target())
            .unwrap_or(false)
    }

    fn pipeline(&self) -> u32 {
        lock_handle(&**self, "vision")
            .map(|v| v.pipeline())
            .unwrap_or(0)
    }

    fn set_pipeline(&mut self, index: u32) -> Result<(), ControlError> {
        lock_handle(&**self, "vision")?.set_pipeline(index)
    }
}

//! `krypton-control` – the motion-control core.
//!
//! Everything here is synchronous and allocation-light: one `execute()` call
//! per control cycle, no threads, no blocking.
//!
//! # Modules
//!
//! - [`units`] – inches/degrees to encoder ticks and
//!   [`DriveGeometry`][units::DriveGeometry].
//! - [`limiter`] – [`RatioClampedSpeedLimiter`][limiter::RatioClampedSpeedLimiter]:
//!   scales a group of speeds down together so their ratios survive.
//! - [`planner`] – [`PositionTargetPlanner`][planner::PositionTargetPlanner]:
//!   distance and curve requests to per-actuator targets and speed ratios.
//! - [`mix`] – tank and mecanum mixing of `(strafe, forward, rotate)` feeds.
//! - [`drive`] – [`DriveController`][drive::DriveController]: closed-loop
//!   drivetrain motion with encoder-loss fallback to open loop.
//! - [`aim`] – [`AimController`][aim::AimController]: vision-guided turret
//!   and hood aiming.
//! - [`commands`] – [`Command`][krypton_kernel::Command] wrappers the
//!   scheduler runs.

pub mod aim;
pub mod commands;
pub mod drive;
pub mod limiter;
pub mod mix;
pub mod planner;
pub mod units;

pub use aim::{AimAxis, AimConfig, AimController, AimState};
pub use commands::{AimCommand, DRIVETRAIN, DriveMotionCommand, TapeApproachCommand, VISION};
pub use drive::{DriveController, DriveControllerConfig, DriveState};
pub use limiter::RatioClampedSpeedLimiter;
pub use mix::{ReversalCooldown, VelocityInput};
pub use planner::PositionTargetPlanner;
pub use units::DriveGeometry;

//! `krypton-runtime` – the fixed-period control loop and everything needed
//! to stand a robot up around it.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: refreshes
//!   the hardware, runs the [`CommandScheduler`][krypton_kernel::CommandScheduler]
//!   once per period, and measures each cycle with a
//!   [`CycleWatchdog`][krypton_kernel::CycleWatchdog].  A shared stop flag
//!   cancels every command through `end(true)`.
//! - [`robot`] – [`Robot`][robot::Robot]: the composition root.  Builds the
//!   simulated hardware, seeds the tunables table, and creates drive, aim and
//!   tape-approach commands wired to one shared registry.
//! - [`config`] – [`RobotConfig`][config::RobotConfig]: `~/.krypton/config.toml`
//!   with `KRYPTON_*` environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod config;
pub mod control_loop;
pub mod robot;
pub mod telemetry;

pub use config::{ConfigError, RobotConfig, SimConfig};
pub use control_loop::{ControlLoop, CycleReport, RunOutcome};
pub use robot::{Robot, RobotStatus};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

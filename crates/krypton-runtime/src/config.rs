//! Robot configuration – reads/writes `~/.krypton/config.toml`.
//!
//! Every field has a default, so a partial file (or none at all) yields a
//! working configuration.
//!
//! ```toml
//! control_period_ms = 20
//!
//! [drive]
//! mode = "closed_loop_velocity"
//! max_speed = 8000.0
//!
//! [hood]
//! actuator = "hood"
//! axis = "elevation"
//! finish_on_target = true
//!
//! [hood.distance_compensation]
//! intercept = 1.0
//! slope = 0.02
//!
//! [tunables]
//! "cameraTable/tapeStrafe" = 0.0
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use krypton_control::{AimConfig, DriveControllerConfig};
use krypton_types::ControlError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while loading or saving the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] ControlError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Simulated hardware parameters used by the interactive shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub drive_max_ticks_per_sec: f64,
    pub aim_max_ticks_per_sec: f64,
    pub aim_ticks_per_degree: f64,
    /// Build a four-wheel mecanum base instead of two tracks.
    pub mecanum: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            drive_max_ticks_per_sec: 10_000.0,
            aim_max_ticks_per_sec: 5_000.0,
            aim_ticks_per_degree: 100.0,
            mecanum: false,
        }
    }
}

/// Persisted robot configuration stored in `~/.krypton/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub control_period_ms: u64,
    pub drive: DriveControllerConfig,
    pub turret: AimConfig,
    pub hood: AimConfig,
    pub sim: SimConfig,
    /// Initial values for the shared tunables table.
    pub tunables: BTreeMap<String, f64>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            control_period_ms: 20,
            drive: DriveControllerConfig::default(),
            turret: AimConfig::turret(),
            hood: AimConfig::hood(),
            sim: SimConfig::default(),
            tunables: BTreeMap::new(),
        }
    }
}

impl RobotConfig {
    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }

    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.control_period_ms == 0 {
            return Err(ControlError::invalid("control_period_ms", "must be positive"));
        }
        self.drive.validate()?;
        self.turret.validate()?;
        self.hood.validate()?;
        for (key, value) in &self.tunables {
            krypton_types::require_finite(key, *value)?;
        }
        Ok(())
    }
}

/// Return the path to `~/.krypton/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".krypton").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
///
/// # Errors
///
/// See [`load_from`].
pub fn load() -> Result<Option<RobotConfig>, ConfigError> {
    load_from(&config_path())
}

/// Load, apply `KRYPTON_*` overrides and validate.
///
/// # Errors
///
/// [`ConfigError`] when the file cannot be read or parsed, or the result is
/// invalid.
pub fn load_from(path: &Path) -> Result<Option<RobotConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(io_error(path))?;
    let mut cfg: RobotConfig = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    debug!(path = %path.display(), "config loaded");
    Ok(Some(cfg))
}

/// Apply `KRYPTON_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KRYPTON_CONTROL_PERIOD_MS` | `control_period_ms` |
/// | `KRYPTON_MAX_SPEED` | `drive.max_speed` |
pub fn apply_env_overrides(cfg: &mut RobotConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

/// [`apply_env_overrides`] with an injectable variable lookup.  Unparsable
/// or out-of-range values are ignored with a warning.
pub fn apply_overrides_from(cfg: &mut RobotConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("KRYPTON_CONTROL_PERIOD_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => cfg.control_period_ms = ms,
            _ => warn!(value = %v, "ignoring KRYPTON_CONTROL_PERIOD_MS"),
        }
    }
    if let Some(v) = lookup("KRYPTON_MAX_SPEED") {
        match v.trim().parse::<f64>() {
            Ok(speed) if speed.is_finite() && speed > 0.0 => cfg.drive.max_speed = speed,
            _ => warn!(value = %v, "ignoring KRYPTON_MAX_SPEED"),
        }
    }
}

/// Save the config to disk, creating `~/.krypton/` if necessary.
///
/// # Errors
///
/// See [`save_to`].
pub fn save(cfg: &RobotConfig) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path with owner-only permissions on Unix.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_to(cfg: &RobotConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(io_error(parent))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(io_error(path))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(io_error(path))?;
    Ok(())
}

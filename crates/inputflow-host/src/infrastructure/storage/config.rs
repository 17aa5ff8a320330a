//! TOML-based configuration for the inputflow host.
//!
//! Reads and writes [`AppConfig`] at `$XDG_CONFIG_HOME/inputflow/config.toml`
//! (falling back to `~/.config/inputflow/config.toml`).  A missing file is not
//! an error: the host starts with defaults.
//!
//! # What goes in the file? (for beginners)
//!
//! ```toml
//! [host]
//! device_dir = "/dev/input"
//! log_level = "info"
//!
//! [seats]
//! default_seat_id = "seat0"
//!
//! [[seats.assignments]]
//! device_name = "ELAN Touchscreen"
//! seat_id = "seat0"
//! seat_name = "left-panel"
//!
//! [gestures]
//! tap_max_interval_ms = 200
//!
//! [[displays.physical]]
//! id = 0
//! width = 1920
//! height = 1080
//! logical_width = 1920
//! logical_height = 1080
//!
//! [[displays.logical]]
//! id = 0
//! top_left_x = 0
//! top_left_y = 0
//! width = 1920
//! height = 1080
//! ```
//!
//! Every field has a default (`#[serde(default = "...")]`), so a partial file
//! only overrides what it names.  The `[displays]` tables are the initial
//! topology handed to `WindowStateManager::update_display_info` at start-up.

use std::path::{Path, PathBuf};

use inputflow_core::{
    GestureConfig, LogicalDisplay, PhysicalDisplayState, DEFAULT_SEAT_ID, DEFAULT_SEAT_NAME,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub seats: SeatsConfig,
    #[serde(default)]
    pub gestures: GesturesConfig,
    #[serde(default)]
    pub displays: DisplaysConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Directory scanned and watched for `event*` device nodes.
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How devices are grouped into seats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatsConfig {
    /// Seat for devices without an assignment.
    #[serde(default = "default_seat_id")]
    pub default_seat_id: String,
    #[serde(default = "default_seat_name")]
    pub default_seat_name: String,
    #[serde(default)]
    pub assignments: Vec<SeatAssignment>,
}

/// Pins a device, matched by its exact kernel name, to a seat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatAssignment {
    pub device_name: String,
    #[serde(default = "default_seat_id")]
    pub seat_id: String,
    #[serde(default = "default_seat_name")]
    pub seat_name: String,
}

/// Touchpad gesture tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GesturesConfig {
    /// When `false`, touchpads get no transformer chain and their contacts
    /// produce no cursor motion.
    #[serde(default = "default_true")]
    pub enable_touchpad_gestures: bool,
    #[serde(flatten)]
    pub tuning: GestureConfig,
}

/// Initial display topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DisplaysConfig {
    #[serde(default)]
    pub physical: Vec<PhysicalDisplayState>,
    #[serde(default)]
    pub logical: Vec<LogicalDisplay>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_dir() -> PathBuf {
    PathBuf::from("/dev/input")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_seat_id() -> String {
    DEFAULT_SEAT_ID.to_string()
}
fn default_seat_name() -> String {
    DEFAULT_SEAT_NAME.to_string()
}
fn default_true() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            device_dir: default_device_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SeatsConfig {
    fn default() -> Self {
        Self {
            default_seat_id: default_seat_id(),
            default_seat_name: default_seat_name(),
            assignments: Vec::new(),
        }
    }
}

impl Default for GesturesConfig {
    fn default() -> Self {
        Self {
            enable_touchpad_gestures: default_true(),
            tuning: GestureConfig::default(),
        }
    }
}

impl SeatsConfig {
    /// Returns the `(seat_id, seat_name)` a device named `device_name` belongs to.
    pub fn seat_for(&self, device_name: &str) -> (String, String) {
        self.assignments
            .iter()
            .find(|a| a.device_name == device_name)
            .map(|a| (a.seat_id.clone(), a.seat_name.clone()))
            .unwrap_or_else(|| (self.default_seat_id.clone(), self.default_seat_name.clone()))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the default path, returning defaults if the file
/// does not exist yet.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Persists `config` to the default path.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("inputflow"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Engine settings with XDG Base Directory compliance.
//!
//! This module provides settings management with proper XDG directory
//! usage for the config file and the listen ledger database.

use std::{
    env::var,
    fs::{create_dir_all, read_to_string, write},
    io::Error as StdError,
    path::PathBuf,
    time::Duration,
};

use {
    parking_lot::{RwLock, RwLockReadGuard},
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str, to_string_pretty},
    thiserror::Error,
    tracing::debug,
};

use crate::session::CeilingPolicy;

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read or write settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to serialize or deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// Serializable engine settings with default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Whether to route playback through the out-of-process audio service.
    pub use_native_audio: bool,
    /// Executable of the native audio service.
    pub native_service_path: Option<String>,
    /// How long to wait for the native service's `ready` message.
    pub native_handshake_timeout_ms: u64,
    /// Visualizer sync offset in seconds (native backend only).
    pub lookahead_secs: f64,
    /// Interval at which in-process media handles are polled.
    pub poll_interval_ms: u64,
    /// Initial output volume in `[0, 1]`.
    pub volume: f32,
    /// Seconds into a track after which "previous" restarts it instead.
    pub restart_threshold_secs: f64,
    /// Sanity ceilings applied to listening-time deltas.
    pub ceilings: CeilingPolicy,
    /// Number of entries kept in the recently-played list.
    pub history_capacity: usize,
    /// Location of the listen ledger database (XDG data home when unset).
    pub ledger_path: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            use_native_audio: false,
            native_service_path: None,
            native_handshake_timeout_ms: 2000,
            lookahead_secs: 0.0,
            poll_interval_ms: 100,
            volume: 1.0,
            restart_threshold_secs: 3.0,
            ceilings: CeilingPolicy::default(),
            history_capacity: 100,
            ledger_path: None,
        }
    }
}

impl EngineSettings {
    /// Checks that every value is within its accepted range.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |reason: &str| {
            Err(SettingsError::InvalidValue {
                reason: reason.to_string(),
            })
        };

        if !(0.0..=1.0).contains(&self.volume) {
            return invalid("volume must be within [0, 1]");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be positive");
        }
        if !self.lookahead_secs.is_finite() || self.lookahead_secs < 0.0 {
            return invalid("lookahead_secs must be a non-negative number");
        }
        if !self.restart_threshold_secs.is_finite() || self.restart_threshold_secs < 0.0 {
            return invalid("restart_threshold_secs must be a non-negative number");
        }
        let CeilingPolicy {
            tick_secs,
            pause_secs,
            shutdown_secs,
        } = self.ceilings;
        if [tick_secs, pause_secs, shutdown_secs]
            .iter()
            .any(|ceiling| !ceiling.is_finite() || *ceiling <= 0.0)
        {
            return invalid("ceilings must be positive numbers");
        }
        if self.history_capacity == 0 {
            return invalid("history_capacity must be positive");
        }

        Ok(())
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Native service handshake timeout as a `Duration`.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.native_handshake_timeout_ms)
    }

    /// Resolves the ledger database path, falling back to the XDG data home.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .as_ref()
            .map_or_else(|| get_data_dir().join("listens.db"), PathBuf::from)
    }
}

/// Handles loading, saving, and validation of engine settings.
#[derive(Debug)]
pub struct SettingsManager {
    /// Thread-safe settings storage.
    settings: RwLock<EngineSettings>,
    /// Path to the configuration file on disk.
    config_path: PathBuf,
}

impl SettingsManager {
    /// Creates a new settings manager with default config path.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk.
    pub fn new() -> Result<Self, SettingsError> {
        Self::with_config_path(get_config_path())
    }

    /// Creates a new settings manager with a custom config path (for testing).
    ///
    /// # Arguments
    ///
    /// * `config_path` - Custom path for the settings file
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk or
    /// the stored values are out of range.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, SettingsError> {
        if let Some(parent) = config_path.parent() {
            create_dir_all(parent)?;
        }

        let settings: EngineSettings = if config_path.exists() {
            debug!("Loading settings from existing file: {:?}", config_path);
            let contents = read_to_string(&config_path)?;
            from_str(&contents)?
        } else {
            debug!("Using default settings, no file at {:?}", config_path);
            EngineSettings::default()
        };
        settings.validate()?;

        Ok(SettingsManager {
            settings: RwLock::new(settings),
            config_path,
        })
    }

    /// Gets the current settings.
    pub fn get_settings(&self) -> RwLockReadGuard<'_, EngineSettings> {
        self.settings.read()
    }

    /// Gets the configuration file path.
    pub fn get_config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Validates and applies new settings, then saves them to disk.
    ///
    /// # Arguments
    ///
    /// * `new_settings` - New settings to apply.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if a value is invalid or the file cannot be written.
    pub fn update_settings(&self, new_settings: EngineSettings) -> Result<(), SettingsError> {
        new_settings.validate()?;
        *self.settings.write() = new_settings;
        self.save_settings()
    }

    fn save_settings(&self) -> Result<(), SettingsError> {
        debug!("Saving settings to file: {:?}", self.config_path);
        let contents = to_string_pretty(&*self.settings.read())?;
        write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Path of the settings file under the XDG config home.
#[must_use]
pub fn get_config_path() -> PathBuf {
    let mut config_dir = xdg_home("XDG_CONFIG_HOME", ".config");
    config_dir.push("segue");
    config_dir.push("settings.json");
    config_dir
}

/// Directory for persistent data (the listen ledger) under the XDG data home.
#[must_use]
pub fn get_data_dir() -> PathBuf {
    let mut data_dir = xdg_home("XDG_DATA_HOME", ".local/share");
    data_dir.push("segue");
    data_dir
}

/// Resolves an XDG base directory, defaulting to `$HOME/<fallback>`.
fn xdg_home(variable: &str, fallback: &str) -> PathBuf {
    if let Ok(dir) = var(variable)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }

    if let Ok(home) = var("HOME") {
        return PathBuf::from(home).join(fallback);
    }

    PathBuf::from(".")
}

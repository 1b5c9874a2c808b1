//! Engine settings and persistent configuration.
//!
//! This module provides settings management with XDG Base Directory
//! compliance.

pub mod settings;

pub use settings::{EngineSettings, SettingsError, SettingsManager, get_config_path, get_data_dir};

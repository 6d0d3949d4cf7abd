//! Application configuration
//!
//! Loaded from a TOML file; every section falls back to its defaults when
//! absent so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_APP_VERSION, DEFAULT_PLAY_DELAY_MS};
use crate::error::{Error, Result};

/// Top level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub voice: VoiceSettings,
    pub logging: LoggingConfig,
    pub devices: DeviceConfig,
}

/// Voice session behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Connect the voice session whenever the primary session joins a room,
    /// and move it along when the primary room changes
    pub auto_connect: bool,
    /// Disconnect the voice session when the primary session leaves its room
    /// or disconnects
    pub auto_disconnect: bool,
    /// Playback delay handed to endpoints when they are linked
    pub play_delay_ms: u32,
    /// Log microphone and recorder changes at info level
    pub debug_info: bool,
    pub app_id: String,
    pub app_version: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            auto_disconnect: true,
            play_delay_ms: DEFAULT_PLAY_DELAY_MS,
            debug_info: false,
            app_id: String::new(),
            app_version: DEFAULT_APP_VERSION.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Capture device selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Global microphone; `None` uses the system default
    pub microphone: Option<String>,
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Platform config file location, e.g. `~/.config/voice-room-sync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voice-room-sync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location, or fall back to defaults
    /// when no file exists. A file that exists but fails to parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load(&path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

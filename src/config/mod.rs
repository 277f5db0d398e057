//! Configuration module for CurveBug-RS
//!
//! This module handles:
//! - Tracer configuration (`config.toml`): serial link, acquisition pacing,
//!   view limits and logging
//! - Application state persistence (`app_state.json`): the last port that
//!   connected successfully, tried first by auto-detection
//!
//! # Locations
//!
//! Configuration lives in the platform config directory and state in the
//! platform data directory, both under [`APP_ID`]:
//! - **Linux**: `~/.config/dev.curvebug.curvebug-rs/`, `~/.local/share/dev.curvebug.curvebug-rs/`
//! - **macOS**: `~/Library/Application Support/dev.curvebug.curvebug-rs/`
//! - **Windows**: `%APPDATA%\dev.curvebug.curvebug-rs\`
//!
//! # Example
//!
//! ```ignore
//! use curvebug_rs::config::{AppState, TracerConfig};
//!
//! let config = TracerConfig::load_or_default(TracerConfig::default_path());
//! let mut state = AppState::load_or_default();
//! state.remember_port("/dev/ttyACM0");
//! state.save()?;
//! ```

use crate::error::{CurveBugError, Result};
use crate::types::ExcitationMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config and data directories
pub const APP_ID: &str = "dev.curvebug.curvebug-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Baud rate the tracer firmware expects
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Target acquisition cadence
pub const DEFAULT_CYCLE_RATE_HZ: u32 = 20;

/// Per-acquisition read deadline in milliseconds
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 500;

// ==================== Directories ====================

/// Get the application config directory path
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        CurveBugError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            CurveBugError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

// ==================== Tracer Config ====================

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port to open; `None` auto-detects
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Wait after opening before flushing input, in milliseconds
    pub settle_ms: u64,
    /// Retry the connection after it drops
    pub auto_reconnect: bool,
    pub reconnect_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            settle_ms: 100,
            auto_reconnect: true,
            reconnect_interval_ms: 1000,
        }
    }
}

impl SerialConfig {
    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Acquisition loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub frame_timeout_ms: u64,
    pub cycle_rate_hz: u32,
    /// Consecutive timeouts before the link is reported as not connected
    pub disconnect_after_timeouts: u32,
    pub initial_mode: ExcitationMode,
    /// Capacity of the backend-to-frontend message queue
    pub channel_buffer_size: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            cycle_rate_hz: DEFAULT_CYCLE_RATE_HZ,
            disconnect_after_timeouts: 3,
            initial_mode: ExcitationMode::default(),
            channel_buffer_size: 64,
        }
    }
}

impl AcquisitionConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Target time per cycle; `None` when pacing is disabled
    pub fn cycle_interval(&self) -> Option<Duration> {
        (self.cycle_rate_hz > 0)
            .then(|| Duration::from_micros(1_000_000 / u64::from(self.cycle_rate_hz)))
    }
}

/// Initial view flags and view limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub auto_scale: bool,
    pub single_channel: bool,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Largest pan offset per axis in ADC units
    pub pan_limit: f64,
    /// Fraction of the viewport left empty per side in auto-scale
    pub auto_margin: f64,
    /// Smallest auto-scale box edge in ADC units
    pub min_box_span: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            auto_scale: false,
            single_channel: false,
            min_zoom: 0.1,
            max_zoom: 50.0,
            pan_limit: 8192.0,
            auto_margin: 0.05,
            min_box_span: 200.0,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write daily rolling log files here
    pub directory: Option<PathBuf>,
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

/// Complete tracer configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub serial: SerialConfig,
    pub acquisition: AcquisitionConfig,
    pub view: ViewConfig,
    pub logging: LoggingConfig,
}

impl TracerConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        app_config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CurveBugError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CurveBugError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration, returning defaults if the file is missing or invalid
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CurveBugError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CurveBugError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            CurveBugError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

// ==================== App State ====================

/// Persistent application state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migration support
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Last port that connected successfully
    #[serde(default)]
    pub last_port: Option<String>,

    /// Excitation mode active at last exit
    #[serde(default)]
    pub last_mode: Option<ExcitationMode>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            last_port: None,
            last_mode: None,
        }
    }
}

impl AppState {
    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            CurveBugError::Config("Could not determine app state path".to_string())
        })?;
        Self::load_from(path)
    }

    /// Load app state from a specific file; a missing file yields defaults
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CurveBugError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| CurveBugError::Config(format!("Failed to parse app state: {}", e)))
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(APP_STATE_FILE))
    }

    /// Save app state to a specific file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CurveBugError::Config(format!("Failed to serialize app state: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CurveBugError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Record a port that just connected
    pub fn remember_port(&mut self, port: &str) {
        self.last_port = Some(port.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tracer_firmware() {
        let config = TracerConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.settle_time(), Duration::from_millis(100));
        assert_eq!(config.acquisition.frame_timeout(), Duration::from_millis(500));
        assert_eq!(
            config.acquisition.cycle_interval(),
            Some(Duration::from_millis(50))
        );
        assert_eq!(config.acquisition.initial_mode, ExcitationMode::Mode4K7);
        assert!(!config.view.auto_scale);
    }

    #[test]
    fn test_zero_rate_disables_pacing() {
        let acquisition = AcquisitionConfig {
            cycle_rate_hz: 0,
            ..Default::default()
        };
        assert!(acquisition.cycle_interval().is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = TracerConfig::from_toml(
            r#"
            [serial]
            port = "/dev/ttyACM0"

            [acquisition]
            initial_mode = "Alternating"

            [view]
            auto_scale = true
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.acquisition.initial_mode, ExcitationMode::Alternating);
        assert_eq!(config.acquisition.cycle_rate_hz, DEFAULT_CYCLE_RATE_HZ);
        assert!(config.view.auto_scale);
        assert_eq!(config.view.max_zoom, 50.0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TracerConfig::from_toml("[serial\nport = 1").unwrap_err();
        assert!(matches!(err, CurveBugError::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = TracerConfig::default();
        config.serial.port = Some("COM7".to_string());
        config.view.single_channel = true;
        config.logging.filter = Some("debug".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(TracerConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_app_state_default() {
        let state = AppState::default();
        assert_eq!(state.version, 1);
        assert!(state.last_port.is_none());
    }

    #[test]
    fn test_app_state_serialization() {
        let mut state = AppState::default();
        state.remember_port("/dev/ttyUSB0");
        state.last_mode = Some(ExcitationMode::Mode100KWeak);

        let json = serde_json::to_string_pretty(&state).unwrap();
        let parsed: AppState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);

        let legacy: AppState = serde_json::from_str("{}").unwrap();
        assert_eq!(legacy, AppState::default());
    }
}

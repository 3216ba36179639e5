//! GPSTrack Configuration
//!
//! This module provides configuration structures for the GPS tracking
//! core and its durable session store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::sensor::SamplingRate;

/// Minimum distance between location updates, in meters.
///
/// Every location request uses this value, including re-requests after a
/// refresh interval change.
pub const MIN_DISTANCE_METERS: f32 = 2.0;

/// Main GPSTrack configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpsTrackConfig {
    /// Tracking behaviour
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Session storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Location refresh interval in milliseconds
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: i64,

    /// Minimum distance between updates in meters (informational, always 2.0)
    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: f32,

    /// Sampling rate requested from the pressure sensor
    #[serde(default)]
    pub sensor_sampling: SamplingRate,

    /// Re-publish the last fix when an NMEA sentence follows it
    #[serde(default = "default_true")]
    pub nmea_republish: bool,

    /// Stored distance is resumed if the last start is younger than this
    #[serde(default = "default_session_resume_window_secs")]
    pub session_resume_window_secs: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the preferences database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default)]
    pub format: LogFormat,

    /// Also log to this file (optional)
    pub file: Option<PathBuf>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

// Default value functions
fn default_refresh_interval_ms() -> i64 {
    1000
}

fn default_min_distance_m() -> f32 {
    MIN_DISTANCE_METERS
}

fn default_true() -> bool {
    true
}

fn default_session_resume_window_secs() -> u64 {
    12 * 60 * 60
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/gpstrack")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            min_distance_m: default_min_distance_m(),
            sensor_sampling: SamplingRate::default(),
            nmea_republish: true,
            session_resume_window_secs: default_session_resume_window_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl GpsTrackConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GpsTrackConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: GpsTrackConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// The refresh interval is deliberately not range-checked here: it is
    /// handed to the location provider, which decides what it accepts.
    pub fn validate(&self) -> crate::Result<()> {
        if (self.tracking.min_distance_m - MIN_DISTANCE_METERS).abs() > f32::EPSILON {
            return Err(crate::Error::Config(format!(
                "tracking.min_distance_m must be {}",
                MIN_DISTANCE_METERS
            )));
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("storage.data_dir cannot be empty".into()));
        }

        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.data_dir
    }

    /// Get the session resume window as Duration
    pub fn session_resume_window(&self) -> Duration {
        Duration::from_secs(self.tracking.session_resume_window_secs)
    }
}

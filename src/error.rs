//! GPSTrack Error Types

use thiserror::Error;

/// Result type alias for GPSTrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// GPSTrack error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Provider errors
    #[error("Location provider unavailable: {0}")]
    ProviderUnavailable(String),

    // Persistence errors
    #[error("Failed to commit session state during {operation}")]
    PersistenceCommit { operation: &'static str },

    #[error("State error: {0}")]
    State(String),

    // Bus errors
    #[error("Event bus error: {0}")]
    Bus(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if the tracker recovers from this error by degrading to Disabled
    pub fn is_degradation(&self) -> bool {
        matches!(self, Error::ProviderUnavailable(_))
    }

    /// Check if this error leaves a durability gap (in-memory state moved on, store did not)
    pub fn is_durability_gap(&self) -> bool {
        matches!(self, Error::PersistenceCommit { .. } | Error::State(_))
    }
}

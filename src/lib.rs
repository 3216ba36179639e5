//! GPSTrack - GPS Activity Tracking Core
//!
//! Tracks a device's location and derived metrics (altitude, speed,
//! distance) during an activity session and relays tracking status to
//! paired consumers such as a wearable display.
//!
//! # Architecture
//!
//! A single state machine ([`tracker::GpsTracker`]) owns every subscription
//! to the location and sensor providers. Callers post lifecycle requests on
//! the [`bus::EventBus`]; the tracker reacts, persists session state through
//! a [`store::PreferenceStore`] and republishes status and location events
//! on the same bus.
//!
//! # Features
//!
//! - Idempotent start/stop with deduplicated status events
//! - Crash-safe elapsed distance and session start time
//! - Barometric altitude correlation when a pressure sensor is present
//! - Capability traits with simulated providers for testing

pub mod config;
pub mod error;
pub mod bus;
pub mod location;
pub mod logging;
pub mod sensor;
pub mod store;
pub mod time;
pub mod tracker;

pub use config::GpsTrackConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::GpsTrackConfig;
    pub use crate::error::{Error, Result};
    pub use crate::bus::{BusMessage, EventBus, LifecycleRequest, TrackingState};
    pub use crate::location::{Fix, LocationSource};
    pub use crate::sensor::SensorSource;
    pub use crate::store::{PreferenceStore, SqlitePreferenceStore};
    pub use crate::time::{SystemClock, TimeSource};
    pub use crate::tracker::GpsTracker;
}

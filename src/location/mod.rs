//! Location Provider Module
//!
//! Capability interface over the platform positioning service. The tracker
//! is the only caller of the subscribe/unsubscribe methods; implementations
//! deliver fixes and raw NMEA sentences through the listener traits, on
//! whatever thread the platform uses.

mod simulated;

pub use simulated::{LocationCall, SimulatedLocationSource};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single location measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above the WGS84 ellipsoid
    #[serde(default)]
    pub altitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Horizontal accuracy in meters
    #[serde(default)]
    pub accuracy: f32,
    /// Ground speed reported by the receiver, if any
    #[serde(default)]
    pub speed_mps: Option<f32>,
}

/// Receives accepted location fixes
pub trait LocationListener: Send + Sync {
    fn on_location_changed(&self, fix: &Fix);
}

/// Receives raw satellite sentences
pub trait NmeaListener: Send + Sync {
    fn on_nmea_received(&self, timestamp_ms: i64, sentence: &str);
}

/// Platform positioning service
pub trait LocationSource: Send + Sync {
    /// Whether the GPS provider is currently enabled
    fn is_enabled(&self) -> bool;

    /// Start delivering fixes to `listener`
    fn request_updates(
        &self,
        interval_ms: i64,
        min_distance_m: f32,
        listener: Arc<dyn LocationListener>,
    ) -> Result<()>;

    /// Stop delivering fixes to `listener`
    fn remove_updates(&self, listener: &Arc<dyn LocationListener>);

    /// Register a raw NMEA listener
    fn add_nmea_listener(&self, listener: Arc<dyn NmeaListener>) -> bool;

    /// Remove a raw NMEA listener
    fn remove_nmea_listener(&self, listener: &Arc<dyn NmeaListener>);
}

/// Check whether two listener handles refer to the same listener instance
pub fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Great-circle distance between two fixes in meters
pub fn haversine_distance(a: &Fix, b: &Fix) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_008.8;

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(latitude: f64, longitude: f64) -> Fix {
        Fix {
            latitude,
            longitude,
            altitude: 0.0,
            timestamp_ms: 0,
            accuracy: 5.0,
            speed_mps: None,
        }
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_distance(&fix(0.0, 0.0), &fix(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_haversine_same_point() {
        let p = fix(51.5007, -0.1246);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_fix_json_defaults() {
        let parsed: Fix =
            serde_json::from_str(r#"{"latitude":1.5,"longitude":2.5,"timestamp_ms":10}"#).unwrap();
        assert_eq!(parsed.altitude, 0.0);
        assert_eq!(parsed.speed_mps, None);
    }

    struct Noop;
    impl LocationListener for Noop {
        fn on_location_changed(&self, _fix: &Fix) {}
    }

    #[test]
    fn test_same_listener_identity() {
        let a: Arc<dyn LocationListener> = Arc::new(Noop);
        let b: Arc<dyn LocationListener> = Arc::new(Noop);
        assert!(same_listener(&a, &a.clone()));
        assert!(!same_listener(&a, &b));
    }
}

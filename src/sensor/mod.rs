//! Sensor Provider Module
//!
//! Capability interface over altitude-capable hardware sensors. A
//! registered sensor may draw significant power, so every successful
//! `register` must be paired with exactly one `unregister`.

mod simulated;

pub use simulated::{SensorCall, SimulatedSensorSource};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Mean sea-level pressure in hPa
pub const STANDARD_ATMOSPHERE_HPA: f32 = 1013.25;

/// Hardware sensor kinds the tracker uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    /// Barometric pressure in hPa
    Pressure,
}

/// Requested sensor delivery rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingRate {
    Fastest,
    Game,
    Ui,
    #[default]
    Normal,
}

impl SamplingRate {
    /// Nominal delay between samples in microseconds
    pub fn delay_us(&self) -> u32 {
        match self {
            SamplingRate::Fastest => 0,
            SamplingRate::Game => 20_000,
            SamplingRate::Ui => 66_667,
            SamplingRate::Normal => 200_000,
        }
    }
}

/// One sensor sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_type: SensorType,
    pub value: f32,
    pub timestamp_ns: i64,
}

/// Receives sensor samples
pub trait SensorListener: Send + Sync {
    fn on_sensor_changed(&self, reading: &SensorReading);
}

/// Platform sensor service
pub trait SensorSource: Send + Sync {
    /// Register `listener`; returns false when the sensor is not present
    fn register(
        &self,
        listener: Arc<dyn SensorListener>,
        sensor_type: SensorType,
        sampling_rate: SamplingRate,
    ) -> bool;

    /// Unregister `listener` from every sensor
    fn unregister(&self, listener: &Arc<dyn SensorListener>);
}

/// Altitude in meters for a pressure reading, relative to `sea_level_hpa`
pub fn pressure_to_altitude(sea_level_hpa: f32, pressure_hpa: f32) -> f32 {
    44_330.0 * (1.0 - (pressure_hpa / sea_level_hpa).powf(1.0 / 5.255))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_altitude_at_sea_level() {
        let altitude = pressure_to_altitude(STANDARD_ATMOSPHERE_HPA, STANDARD_ATMOSPHERE_HPA);
        assert!(altitude.abs() < 0.01);
    }

    #[test]
    fn test_altitude_decreases_with_pressure() {
        let low = pressure_to_altitude(STANDARD_ATMOSPHERE_HPA, 1000.0);
        let high = pressure_to_altitude(STANDARD_ATMOSPHERE_HPA, 900.0);
        assert!(high > low);
        // ~988m for 900 hPa in the standard atmosphere
        assert!((high - 988.0).abs() < 5.0, "got {}", high);
    }

    #[test]
    fn test_sampling_rate_default() {
        assert_eq!(SamplingRate::default(), SamplingRate::Normal);
        assert_eq!(SamplingRate::Normal.delay_us(), 200_000);
    }
}

//! Fix Pipeline
//!
//! Receives provider callbacks on platform threads, accumulates session
//! distance, derives speed, correlates barometric altitude and publishes
//! one `NewLocation` per accepted fix.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::{BusMessage, EventBus, LocationEvent};
use crate::location::{haversine_distance, Fix, LocationListener, NmeaListener};
use crate::sensor::{
    pressure_to_altitude, SensorListener, SensorReading, SensorType, STANDARD_ATMOSPHERE_HPA,
};

#[derive(Debug, Default)]
struct Metrics {
    distance_m: f64,
    speed_mps: f32,
    last_fix: Option<Fix>,
    /// Whether `last_fix` was already re-published after an NMEA sentence
    last_fix_republished: bool,
    barometric_altitude: Option<f32>,
}

/// Shared state behind the provider listeners
pub struct FixPipeline {
    bus: EventBus,
    nmea_republish: bool,
    active: AtomicBool,
    metrics: Mutex<Metrics>,
    published: AtomicU64,
    republished: AtomicU64,
}

impl FixPipeline {
    pub fn new(bus: EventBus, nmea_republish: bool) -> Self {
        Self {
            bus,
            nmea_republish,
            active: AtomicBool::new(false),
            metrics: Mutex::new(Metrics::default()),
            published: AtomicU64::new(0),
            republished: AtomicU64::new(0),
        }
    }

    /// Start accepting callbacks, seeding the distance accumulator
    pub fn begin_session(&self, distance_m: f32) {
        *self.metrics.lock() = Metrics {
            distance_m: distance_m as f64,
            ..Metrics::default()
        };
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop accepting callbacks; returns the elapsed distance
    pub fn end_session(&self) -> f32 {
        self.active.store(false, Ordering::SeqCst);
        self.distance()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Elapsed session distance in meters
    pub fn distance(&self) -> f32 {
        self.metrics.lock().distance_m as f32
    }

    pub fn reset_distance(&self) {
        self.metrics.lock().distance_m = 0.0;
    }

    /// Number of `NewLocation` events published for fresh fixes
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Number of `NewLocation` events re-published after NMEA sentences
    pub fn republished_count(&self) -> u64 {
        self.republished.load(Ordering::SeqCst)
    }

    /// Accept a fix from the location provider
    pub fn accept_fix(&self, fix: &Fix) {
        if !self.is_active() {
            tracing::debug!("Ignoring fix delivered outside a session");
            return;
        }

        let event = {
            let mut metrics = self.metrics.lock();

            if let Some(previous) = metrics.last_fix {
                let step = haversine_distance(&previous, fix);
                metrics.distance_m += step;

                let dt_ms = fix.timestamp_ms - previous.timestamp_ms;
                metrics.speed_mps = match fix.speed_mps {
                    Some(speed) => speed,
                    None if dt_ms > 0 => (step / (dt_ms as f64 / 1000.0)) as f32,
                    None => metrics.speed_mps,
                };
            } else {
                metrics.speed_mps = fix.speed_mps.unwrap_or(0.0);
            }

            metrics.last_fix = Some(*fix);
            metrics.last_fix_republished = false;
            Self::event_for(&metrics, fix)
        };

        self.published.fetch_add(1, Ordering::SeqCst);
        self.publish(event);
    }

    /// NMEA sentences re-trigger publication of the last fix, once
    pub fn on_nmea(&self, timestamp_ms: i64) {
        if !self.nmea_republish || !self.is_active() {
            return;
        }

        let event = {
            let mut metrics = self.metrics.lock();
            let fix = match (metrics.last_fix, metrics.last_fix_republished) {
                (Some(fix), false) => fix,
                _ => return,
            };
            metrics.last_fix_republished = true;
            Self::event_for(&metrics, &fix)
        };

        // A single physical fix produces two NewLocation events on this path
        tracing::debug!(
            "Re-publishing fix {} after NMEA sentence at {}",
            event.timestamp_ms,
            timestamp_ms
        );
        self.republished.fetch_add(1, Ordering::SeqCst);
        self.publish(event);
    }

    /// Record a sensor sample
    pub fn on_sensor(&self, reading: &SensorReading) {
        if !self.is_active() {
            return;
        }
        match reading.sensor_type {
            SensorType::Pressure => {
                let altitude = pressure_to_altitude(STANDARD_ATMOSPHERE_HPA, reading.value);
                self.metrics.lock().barometric_altitude = Some(altitude);
            }
        }
    }

    fn event_for(metrics: &Metrics, fix: &Fix) -> LocationEvent {
        LocationEvent {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: metrics
                .barometric_altitude
                .map(f64::from)
                .unwrap_or(fix.altitude),
            timestamp_ms: fix.timestamp_ms,
            accuracy: fix.accuracy,
            speed_mps: metrics.speed_mps,
            distance_m: metrics.distance_m as f32,
        }
    }

    fn publish(&self, event: LocationEvent) {
        self.bus.post(BusMessage::NewLocation(event));
    }
}

/// Location listener handed to the provider
pub struct GpsLocationListener {
    pipeline: Arc<FixPipeline>,
}

impl GpsLocationListener {
    pub fn new(pipeline: Arc<FixPipeline>) -> Self {
        Self { pipeline }
    }
}

impl LocationListener for GpsLocationListener {
    fn on_location_changed(&self, fix: &Fix) {
        self.pipeline.accept_fix(fix);
    }
}

/// NMEA listener handed to the provider
pub struct GpsNmeaListener {
    pipeline: Arc<FixPipeline>,
}

impl GpsNmeaListener {
    pub fn new(pipeline: Arc<FixPipeline>) -> Self {
        Self { pipeline }
    }
}

impl NmeaListener for GpsNmeaListener {
    fn on_nmea_received(&self, timestamp_ms: i64, _sentence: &str) {
        self.pipeline.on_nmea(timestamp_ms);
    }
}

/// Pressure listener handed to the sensor provider
pub struct GpsSensorListener {
    pipeline: Arc<FixPipeline>,
}

impl GpsSensorListener {
    pub fn new(pipeline: Arc<FixPipeline>) -> Self {
        Self { pipeline }
    }
}

impl SensorListener for GpsSensorListener {
    fn on_sensor_changed(&self, reading: &SensorReading) {
        self.pipeline.on_sensor(reading);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn fix(latitude: f64, timestamp_ms: i64) -> Fix {
        Fix {
            latitude,
            longitude: 0.0,
            altitude: 120.0,
            timestamp_ms,
            accuracy: 4.0,
            speed_mps: None,
        }
    }

    fn locations(rx: &mut tokio::sync::broadcast::Receiver<BusMessage>) -> Vec<LocationEvent> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(BusMessage::NewLocation(event)) => out.push(event),
                Ok(_) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
        out
    }

    #[test]
    fn test_inactive_pipeline_ignores_callbacks() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let pipeline = FixPipeline::new(bus, true);

        pipeline.accept_fix(&fix(0.0, 0));
        pipeline.on_nmea(0);
        assert!(locations(&mut rx).is_empty());
        assert_eq!(pipeline.published_count(), 0);
    }

    #[test]
    fn test_distance_and_speed_accumulate() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let pipeline = FixPipeline::new(bus, true);
        pipeline.begin_session(100.0);

        pipeline.accept_fix(&fix(0.0, 0));
        pipeline.accept_fix(&fix(0.001, 10_000));

        let events = locations(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].distance_m, 100.0);
        assert!((events[1].distance_m - 211.2).abs() < 0.5, "got {}", events[1].distance_m);
        assert!((events[1].speed_mps - 11.12).abs() < 0.05, "got {}", events[1].speed_mps);
        assert!((pipeline.end_session() - 211.2).abs() < 0.5);
    }

    #[test]
    fn test_nmea_republishes_last_fix_once() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let pipeline = FixPipeline::new(bus, true);
        pipeline.begin_session(0.0);

        pipeline.on_nmea(1);
        pipeline.accept_fix(&fix(10.0, 5));
        pipeline.on_nmea(6);
        pipeline.on_nmea(7);

        let events = locations(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], events[1]);
        assert_eq!(pipeline.published_count(), 1);
        assert_eq!(pipeline.republished_count(), 1);
    }

    #[test]
    fn test_nmea_republish_can_be_disabled() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let pipeline = FixPipeline::new(bus, false);
        pipeline.begin_session(0.0);

        pipeline.accept_fix(&fix(10.0, 5));
        pipeline.on_nmea(6);
        assert_eq!(locations(&mut rx).len(), 1);
    }

    #[test]
    fn test_barometric_altitude_overrides_gps() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let pipeline = FixPipeline::new(bus, true);
        pipeline.begin_session(0.0);

        pipeline.on_sensor(&SensorReading {
            sensor_type: SensorType::Pressure,
            value: 900.0,
            timestamp_ns: 0,
        });
        pipeline.accept_fix(&fix(10.0, 5));

        let events = locations(&mut rx);
        assert!((events[0].altitude - 988.0).abs() < 5.0, "got {}", events[0].altitude);
    }

    #[test]
    fn test_reset_distance_mid_session() {
        let bus = EventBus::new();
        let pipeline = FixPipeline::new(bus, true);
        pipeline.begin_session(500.0);
        pipeline.reset_distance();
        assert_eq!(pipeline.distance(), 0.0);
    }
}

//! Simulated Location Source
//!
//! Records every call made against it and lets the owner inject fixes and
//! NMEA sentences into the registered listeners. Used by the tests and by
//! the `simulate` command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{same_listener, Fix, LocationListener, LocationSource, NmeaListener};
use crate::error::{Error, Result};

/// A call made against the simulated source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationCall {
    RequestUpdates {
        interval_ms: i64,
        min_distance_m: f32,
    },
    RemoveUpdates,
    AddNmeaListener,
    RemoveNmeaListener,
}

#[derive(Default)]
struct Registry {
    calls: Vec<LocationCall>,
    location_listeners: Vec<Arc<dyn LocationListener>>,
    nmea_listeners: Vec<Arc<dyn NmeaListener>>,
    /// Every listener ever passed to `request_updates`, in order
    requested: Vec<Arc<dyn LocationListener>>,
}

/// In-process location provider
pub struct SimulatedLocationSource {
    enabled: AtomicBool,
    registry: Mutex<Registry>,
}

impl SimulatedLocationSource {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<LocationCall> {
        self.registry.lock().calls.clone()
    }

    /// Number of calls matching `predicate`
    pub fn count_calls(&self, predicate: impl Fn(&LocationCall) -> bool) -> usize {
        self.registry.lock().calls.iter().filter(|c| predicate(*c)).count()
    }

    /// Number of location listeners currently subscribed
    pub fn active_location_listeners(&self) -> usize {
        self.registry.lock().location_listeners.len()
    }

    /// Number of NMEA listeners currently registered
    pub fn active_nmea_listeners(&self) -> usize {
        self.registry.lock().nmea_listeners.len()
    }

    /// Listeners passed to `request_updates`, oldest first
    pub fn requested_listeners(&self) -> Vec<Arc<dyn LocationListener>> {
        self.registry.lock().requested.clone()
    }

    /// Deliver a fix to every subscribed listener; returns how many got it
    pub fn deliver_fix(&self, fix: &Fix) -> usize {
        // Listeners run outside the lock, as platform callbacks would
        let listeners = self.registry.lock().location_listeners.clone();
        for listener in &listeners {
            listener.on_location_changed(fix);
        }
        listeners.len()
    }

    /// Deliver an NMEA sentence to every registered listener
    pub fn deliver_nmea(&self, timestamp_ms: i64, sentence: &str) -> usize {
        let listeners = self.registry.lock().nmea_listeners.clone();
        for listener in &listeners {
            listener.on_nmea_received(timestamp_ms, sentence);
        }
        listeners.len()
    }
}

impl Default for SimulatedLocationSource {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LocationSource for SimulatedLocationSource {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn request_updates(
        &self,
        interval_ms: i64,
        min_distance_m: f32,
        listener: Arc<dyn LocationListener>,
    ) -> Result<()> {
        let mut registry = self.registry.lock();
        registry.calls.push(LocationCall::RequestUpdates {
            interval_ms,
            min_distance_m,
        });

        if !self.is_enabled() {
            return Err(Error::ProviderUnavailable("gps provider disabled".into()));
        }
        if interval_ms < 0 || min_distance_m < 0.0 {
            return Err(Error::ProviderUnavailable(format!(
                "invalid request: interval={}ms min_distance={}m",
                interval_ms, min_distance_m
            )));
        }

        registry.requested.push(listener.clone());
        registry.location_listeners.push(listener);
        Ok(())
    }

    fn remove_updates(&self, listener: &Arc<dyn LocationListener>) {
        let mut registry = self.registry.lock();
        registry.calls.push(LocationCall::RemoveUpdates);
        registry
            .location_listeners
            .retain(|l| !same_listener(l, listener));
    }

    fn add_nmea_listener(&self, listener: Arc<dyn NmeaListener>) -> bool {
        let mut registry = self.registry.lock();
        registry.calls.push(LocationCall::AddNmeaListener);
        registry.nmea_listeners.push(listener);
        true
    }

    fn remove_nmea_listener(&self, listener: &Arc<dyn NmeaListener>) {
        let mut registry = self.registry.lock();
        registry.calls.push(LocationCall::RemoveNmeaListener);
        registry.nmea_listeners.retain(|l| !same_listener(l, listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl LocationListener for Counting {
        fn on_location_changed(&self, _fix: &Fix) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fix() -> Fix {
        Fix {
            latitude: 1.0,
            longitude: 2.0,
            altitude: 3.0,
            timestamp_ms: 4,
            accuracy: 5.0,
            speed_mps: None,
        }
    }

    #[test]
    fn test_request_and_remove() {
        let source = SimulatedLocationSource::new(true);
        let counting = Arc::new(Counting::default());
        let listener: Arc<dyn LocationListener> = counting.clone();

        source.request_updates(1000, 2.0, listener.clone()).unwrap();
        assert_eq!(source.active_location_listeners(), 1);
        assert_eq!(source.deliver_fix(&fix()), 1);
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);

        source.remove_updates(&listener);
        assert_eq!(source.active_location_listeners(), 0);
        assert_eq!(source.deliver_fix(&fix()), 0);
        assert_eq!(
            source.calls(),
            vec![
                LocationCall::RequestUpdates {
                    interval_ms: 1000,
                    min_distance_m: 2.0
                },
                LocationCall::RemoveUpdates,
            ]
        );
    }

    #[test]
    fn test_rejects_negative_interval() {
        let source = SimulatedLocationSource::new(true);
        let listener: Arc<dyn LocationListener> = Arc::new(Counting::default());
        assert!(source.request_updates(-5, 2.0, listener).is_err());
        assert_eq!(source.active_location_listeners(), 0);
    }

    #[test]
    fn test_disabled_provider_rejects_requests() {
        let source = SimulatedLocationSource::new(false);
        let listener: Arc<dyn LocationListener> = Arc::new(Counting::default());
        let err = source.request_updates(1000, 2.0, listener).unwrap_err();
        assert!(err.is_degradation());
    }
}

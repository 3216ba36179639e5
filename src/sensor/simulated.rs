//! Simulated Sensor Source

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{SamplingRate, SensorListener, SensorReading, SensorSource, SensorType};
use crate::location::same_listener;

/// A call made against the simulated sensor source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCall {
    Register {
        sensor_type: SensorType,
        sampling_rate: SamplingRate,
    },
    Unregister,
}

#[derive(Default)]
struct Registry {
    calls: Vec<SensorCall>,
    listeners: Vec<Arc<dyn SensorListener>>,
}

/// In-process sensor provider with an optional barometer
pub struct SimulatedSensorSource {
    has_barometer: AtomicBool,
    registry: Mutex<Registry>,
}

impl SimulatedSensorSource {
    pub fn new(has_barometer: bool) -> Self {
        Self {
            has_barometer: AtomicBool::new(has_barometer),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn set_has_barometer(&self, present: bool) {
        self.has_barometer.store(present, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SensorCall> {
        self.registry.lock().calls.clone()
    }

    pub fn register_count(&self) -> usize {
        self.registry
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SensorCall::Register { .. }))
            .count()
    }

    pub fn unregister_count(&self) -> usize {
        self.registry
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SensorCall::Unregister))
            .count()
    }

    /// Number of listeners currently registered
    pub fn active_listeners(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Deliver a pressure sample in hPa to every registered listener
    pub fn deliver_pressure(&self, pressure_hpa: f32, timestamp_ns: i64) -> usize {
        let reading = SensorReading {
            sensor_type: SensorType::Pressure,
            value: pressure_hpa,
            timestamp_ns,
        };
        let listeners = self.registry.lock().listeners.clone();
        for listener in &listeners {
            listener.on_sensor_changed(&reading);
        }
        listeners.len()
    }
}

impl SensorSource for SimulatedSensorSource {
    fn register(
        &self,
        listener: Arc<dyn SensorListener>,
        sensor_type: SensorType,
        sampling_rate: SamplingRate,
    ) -> bool {
        let mut registry = self.registry.lock();
        registry.calls.push(SensorCall::Register {
            sensor_type,
            sampling_rate,
        });
        if !self.has_barometer.load(Ordering::SeqCst) {
            return false;
        }
        registry.listeners.push(listener);
        true
    }

    fn unregister(&self, listener: &Arc<dyn SensorListener>) {
        let mut registry = self.registry.lock();
        registry.calls.push(SensorCall::Unregister);
        registry.listeners.retain(|l| !same_listener(l, listener));
    }
}

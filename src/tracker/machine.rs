//! GPS Tracking State Machine
//!
//! Owns the tracking state and every subscribe/unsubscribe call made
//! against the location and sensor providers. All lifecycle requests are
//! serialized through one async mutex; provider callbacks never take it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::pipeline::{FixPipeline, GpsLocationListener, GpsNmeaListener, GpsSensorListener};
use super::session::{SessionSnapshot, SessionStore};
use crate::bus::{BusMessage, EventBus, LifecycleRequest, StatusEvent, TrackingState};
use crate::config::{TrackingConfig, MIN_DISTANCE_METERS};
use crate::error::{Error, Result};
use crate::location::{LocationListener, LocationSource, NmeaListener};
use crate::sensor::{SamplingRate, SensorListener, SensorSource, SensorType};
use crate::store::PreferenceStore;
use crate::time::TimeSource;

/// Mutable state guarded by the lifecycle lock
#[derive(Debug)]
struct Machine {
    state: TrackingState,
    last_published: Option<TrackingState>,
    refresh_interval_ms: i64,
    /// Last interval the provider accepted
    accepted_interval_ms: i64,
    location_subscribed: bool,
    nmea_registered: bool,
    sensor_registered: bool,
}

/// The GPS tracking state machine
pub struct GpsTracker {
    location: Arc<dyn LocationSource>,
    sensor: Arc<dyn SensorSource>,
    session: SessionStore,
    clock: Arc<dyn TimeSource>,
    bus: EventBus,
    pipeline: Arc<FixPipeline>,
    location_listener: Arc<dyn LocationListener>,
    nmea_listener: Arc<dyn NmeaListener>,
    sensor_listener: Arc<dyn SensorListener>,
    sampling_rate: SamplingRate,
    machine: Mutex<Machine>,
}

impl GpsTracker {
    /// Create a tracker in the `Disabled` state
    pub fn new(
        config: &TrackingConfig,
        location: Arc<dyn LocationSource>,
        sensor: Arc<dyn SensorSource>,
        store: Arc<dyn PreferenceStore>,
        clock: Arc<dyn TimeSource>,
        bus: EventBus,
    ) -> Self {
        let pipeline = Arc::new(FixPipeline::new(bus.clone(), config.nmea_republish));
        let resume_window = std::time::Duration::from_secs(config.session_resume_window_secs);

        Self {
            location,
            sensor,
            session: SessionStore::new(store, resume_window),
            clock,
            bus,
            location_listener: Arc::new(GpsLocationListener::new(pipeline.clone())),
            nmea_listener: Arc::new(GpsNmeaListener::new(pipeline.clone())),
            sensor_listener: Arc::new(GpsSensorListener::new(pipeline.clone())),
            pipeline,
            sampling_rate: config.sensor_sampling,
            machine: Mutex::new(Machine {
                state: TrackingState::Disabled,
                last_published: None,
                refresh_interval_ms: config.refresh_interval_ms,
                accepted_interval_ms: config.refresh_interval_ms,
                location_subscribed: false,
                nmea_registered: false,
                sensor_registered: false,
            }),
        }
    }

    /// Current tracking state
    pub async fn state(&self) -> TrackingState {
        self.machine.lock().await.state
    }

    /// Refresh interval used for the next location request
    pub async fn refresh_interval_ms(&self) -> i64 {
        self.machine.lock().await.refresh_interval_ms
    }

    /// Elapsed distance of the current (or last) session in meters
    pub fn elapsed_distance(&self) -> f32 {
        self.pipeline.distance()
    }

    /// Committed session fields
    pub fn persisted_session(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Fix pipeline shared with the provider listeners
    pub fn pipeline(&self) -> &Arc<FixPipeline> {
        &self.pipeline
    }

    /// Handle one lifecycle request
    ///
    /// Returns an error only when a session commit fails; the in-memory
    /// transition and its status event have happened by then.
    pub async fn handle(&self, request: LifecycleRequest) -> Result<()> {
        let mut machine = self.machine.lock().await;
        tracing::debug!("Handling {} in state {}", request.name(), machine.state);

        match request {
            LifecycleRequest::Start => self.start(&mut machine),
            LifecycleRequest::Stop => self.stop(&mut machine),
            LifecycleRequest::Announce => self.announce(&mut machine),
            LifecycleRequest::Reset => self.reset(),
            LifecycleRequest::ChangeRefreshInterval(interval_ms) => {
                self.change_refresh_interval(&mut machine, interval_ms)
            }
        }
    }

    fn start(&self, machine: &mut Machine) -> Result<()> {
        if machine.state == TrackingState::Started {
            tracing::debug!("Start ignored, already started");
            return Ok(());
        }

        // A failed start always answers with Disabled, even if already published
        if !self.location.is_enabled() {
            tracing::warn!("GPS provider disabled, cannot start tracking");
            machine.state = TrackingState::Disabled;
            self.publish(machine);
            return Ok(());
        }

        let now = self.clock.now_millis();
        self.pipeline.begin_session(self.session.restore_distance(now));

        if let Err(e) = self.location.request_updates(
            machine.refresh_interval_ms,
            MIN_DISTANCE_METERS,
            self.location_listener.clone(),
        ) {
            tracing::warn!(
                "Location request rejected ({}), falling back to {}ms",
                e,
                machine.accepted_interval_ms
            );
            self.pipeline.end_session();
            machine.refresh_interval_ms = machine.accepted_interval_ms;
            machine.state = TrackingState::Disabled;
            self.publish(machine);
            return Ok(());
        }
        machine.location_subscribed = true;
        machine.accepted_interval_ms = machine.refresh_interval_ms;

        machine.nmea_registered = self.location.add_nmea_listener(self.nmea_listener.clone());
        if !machine.nmea_registered {
            tracing::warn!("NMEA listener rejected by provider");
        }

        machine.sensor_registered = self.sensor.register(
            self.sensor_listener.clone(),
            SensorType::Pressure,
            self.sampling_rate,
        );
        if !machine.sensor_registered {
            tracing::info!("No pressure sensor, using GPS altitude");
        }

        self.session.record_start(now);
        machine.state = TrackingState::Started;
        tracing::info!(
            "Tracking started (interval={}ms, min_distance={}m)",
            machine.refresh_interval_ms,
            MIN_DISTANCE_METERS
        );
        self.publish_transition(machine);
        Ok(())
    }

    fn stop(&self, machine: &mut Machine) -> Result<()> {
        if machine.state != TrackingState::Started {
            let previous = machine.state;
            if previous == TrackingState::Disabled && self.location.is_enabled() {
                machine.state = TrackingState::Stopped;
            }
            if machine.state != previous {
                self.publish_transition(machine);
            } else {
                tracing::debug!("Stop ignored, state is {}", previous);
            }
            return Ok(());
        }

        let distance = self.release_subscriptions(machine);
        machine.state = TrackingState::Stopped;
        let saved = self.session.save_distance(distance, "stop");
        tracing::info!("Tracking stopped after {:.1}m", distance);
        self.publish_transition(machine);
        saved
    }

    fn announce(&self, machine: &mut Machine) -> Result<()> {
        let mut saved = Ok(());

        if !self.location.is_enabled() {
            if machine.state == TrackingState::Started {
                tracing::warn!("GPS provider disabled while tracking, releasing subscriptions");
                let distance = self.release_subscriptions(machine);
                saved = self.session.save_distance(distance, "announce");
            }
            machine.state = TrackingState::Disabled;
        } else if machine.state == TrackingState::Disabled {
            machine.state = TrackingState::Stopped;
        }

        self.publish(machine);
        saved
    }

    fn reset(&self) -> Result<()> {
        self.pipeline.reset_distance();
        self.session.reset()?;
        tracing::info!("Session distance reset");
        Ok(())
    }

    fn change_refresh_interval(&self, machine: &mut Machine, interval_ms: i64) -> Result<()> {
        machine.refresh_interval_ms = interval_ms;

        if machine.state != TrackingState::Started {
            tracing::debug!("Refresh interval {}ms recorded for next start", interval_ms);
            return Ok(());
        }

        // Remove must land before the new request is issued
        self.location.remove_updates(&self.location_listener);
        machine.location_subscribed = false;

        match self.location.request_updates(
            interval_ms,
            MIN_DISTANCE_METERS,
            self.location_listener.clone(),
        ) {
            Ok(()) => {
                machine.location_subscribed = true;
                machine.accepted_interval_ms = interval_ms;
                tracing::info!("Refresh interval changed to {}ms", interval_ms);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Refresh interval {}ms rejected ({}), disabling tracking",
                    interval_ms,
                    e
                );
                machine.refresh_interval_ms = machine.accepted_interval_ms;
                let distance = self.release_subscriptions(machine);
                machine.state = TrackingState::Disabled;
                let saved = self.session.save_distance(distance, "change_refresh_interval");
                self.publish_transition(machine);
                saved
            }
        }
    }

    /// Undo every live subscription exactly once; returns the session distance
    fn release_subscriptions(&self, machine: &mut Machine) -> f32 {
        if machine.location_subscribed {
            self.location.remove_updates(&self.location_listener);
            machine.location_subscribed = false;
        }
        if machine.nmea_registered {
            self.location.remove_nmea_listener(&self.nmea_listener);
            machine.nmea_registered = false;
        }
        if machine.sensor_registered {
            self.sensor.unregister(&self.sensor_listener);
            machine.sensor_registered = false;
        }
        self.pipeline.end_session()
    }

    /// Publish the current state if it differs from the last published one
    fn publish_transition(&self, machine: &mut Machine) {
        if machine.last_published == Some(machine.state) {
            tracing::debug!("Status {} already published", machine.state);
            return;
        }
        self.publish(machine);
    }

    fn publish(&self, machine: &mut Machine) {
        machine.last_published = Some(machine.state);
        self.bus.post(BusMessage::GpsStatus(StatusEvent {
            status: machine.state,
        }));
    }

    /// Drive the tracker from the event bus until the handle is shut down
    ///
    /// Takes the bus request queue, so requests posted before spawning are
    /// handled too. Fails if another consumer already owns the queue.
    pub fn spawn(self: &Arc<Self>) -> Result<TrackerHandle> {
        let requests = self
            .bus
            .take_requests()
            .ok_or_else(|| Error::Bus("lifecycle requests already consumed".into()))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tracker = self.clone();
        let task = tokio::spawn(async move { tracker.run(requests, shutdown_rx).await });

        Ok(TrackerHandle {
            shutdown: shutdown_tx,
            task,
        })
    }

    async fn run(
        &self,
        mut requests: mpsc::UnboundedReceiver<LifecycleRequest>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!("GPS tracker listening for lifecycle requests");

        loop {
            tokio::select! {
                received = requests.recv() => {
                    let Some(request) = received else { break };
                    match self.handle(request).await {
                        Ok(()) => {}
                        Err(e) if e.is_durability_gap() => {
                            tracing::error!(
                                "{} applied but session state not persisted: {}",
                                request.name(),
                                e
                            );
                        }
                        Err(e) => tracing::error!("{} failed: {}", request.name(), e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        // Release hardware on every exit path
        if self.state().await == TrackingState::Started {
            if let Err(e) = self.handle(LifecycleRequest::Stop).await {
                tracing::error!("Stop on shutdown failed: {}", e);
            }
        }

        tracing::info!("GPS tracker stopped");
    }
}

/// Handle to a tracker task started with [`GpsTracker::spawn`]
pub struct TrackerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    /// Stop the task, releasing subscriptions if tracking is active
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Tracker task failed: {}", e);
        }
    }
}

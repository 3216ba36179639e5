//! Session Persistence
//!
//! Glue between the tracker and the preference store for the two durable
//! session fields: elapsed distance and last start time.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::store::{PreferenceStore, GPS_DISTANCE, GPS_LAST_START};

/// Durable session fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSnapshot {
    pub elapsed_distance_m: f32,
    pub last_start_ms: i64,
}

/// Reads and writes session state through a preference store
pub struct SessionStore {
    store: Arc<dyn PreferenceStore>,
    resume_window_ms: i64,
}

impl SessionStore {
    pub fn new(store: Arc<dyn PreferenceStore>, resume_window: Duration) -> Self {
        Self {
            store,
            resume_window_ms: resume_window.as_millis().min(i64::MAX as u128) as i64,
        }
    }

    /// Committed session fields
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            elapsed_distance_m: self.store.get_float(GPS_DISTANCE, 0.0),
            last_start_ms: self.store.get_long(GPS_LAST_START, 0),
        }
    }

    /// Distance to continue from when a session starts at `now_ms`
    ///
    /// The stored distance carries over only if the previous start lies
    /// within the resume window; otherwise the session restarts at zero.
    pub fn restore_distance(&self, now_ms: i64) -> f32 {
        let snapshot = self.snapshot();
        if snapshot.last_start_ms <= 0 {
            return 0.0;
        }

        let age_ms = match now_ms.checked_sub(snapshot.last_start_ms) {
            Some(age) => age,
            None => return 0.0,
        };
        if (0..=self.resume_window_ms).contains(&age_ms) {
            tracing::info!(
                "Resuming session distance {:.1}m (last start {}ms ago)",
                snapshot.elapsed_distance_m,
                age_ms
            );
            snapshot.elapsed_distance_m
        } else {
            0.0
        }
    }

    /// Stage the session start time; it lands with the next commit
    pub fn record_start(&self, now_ms: i64) {
        self.store.put_long(GPS_LAST_START, now_ms);
    }

    /// Write the elapsed distance and commit synchronously
    pub fn save_distance(&self, distance_m: f32, operation: &'static str) -> Result<()> {
        self.store.put_float(GPS_DISTANCE, distance_m);
        if self.store.commit() {
            tracing::debug!("Committed session distance {:.1}m ({})", distance_m, operation);
            Ok(())
        } else {
            tracing::error!("Session commit failed during {}", operation);
            Err(Error::PersistenceCommit { operation })
        }
    }

    /// Zero the stored distance
    pub fn reset(&self) -> Result<()> {
        self.save_distance(0.0, "reset")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryPreferenceStore, PreferenceValue, StoreCall};

    const HOUR_MS: i64 = 3_600_000;

    fn session(store: &Arc<MemoryPreferenceStore>) -> SessionStore {
        SessionStore::new(store.clone(), Duration::from_secs(12 * 3600))
    }

    #[test]
    fn test_restore_within_window() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.insert(GPS_DISTANCE, PreferenceValue::Float(1500.0));
        store.insert(GPS_LAST_START, PreferenceValue::Long(10 * HOUR_MS));

        assert_eq!(session(&store).restore_distance(11 * HOUR_MS), 1500.0);
    }

    #[test]
    fn test_restart_outside_window() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.insert(GPS_DISTANCE, PreferenceValue::Float(1500.0));
        store.insert(GPS_LAST_START, PreferenceValue::Long(HOUR_MS));

        assert_eq!(session(&store).restore_distance(14 * HOUR_MS), 0.0);
    }

    #[test]
    fn test_restart_without_previous_start() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.insert(GPS_DISTANCE, PreferenceValue::Float(1500.0));

        assert_eq!(session(&store).restore_distance(HOUR_MS), 0.0);
    }

    #[test]
    fn test_corrupt_start_time_restarts_at_zero() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.insert(GPS_DISTANCE, PreferenceValue::Float(1500.0));

        for stored in [i64::MIN, -1, i64::MAX] {
            store.insert(GPS_LAST_START, PreferenceValue::Long(stored));
            assert_eq!(session(&store).restore_distance(HOUR_MS), 0.0);
        }
        assert_eq!(session(&store).restore_distance(i64::MIN), 0.0);
    }

    #[test]
    fn test_reset_writes_zero_and_commits() {
        let store = Arc::new(MemoryPreferenceStore::new());
        session(&store).reset().unwrap();

        assert_eq!(
            store.calls(),
            vec![StoreCall::PutFloat(GPS_DISTANCE.to_string(), 0.0), StoreCall::Commit]
        );
    }

    #[test]
    fn test_commit_failure_is_reported() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.set_fail_commits(true);

        let err = session(&store).save_distance(42.0, "stop").unwrap_err();
        assert!(matches!(err, Error::PersistenceCommit { operation: "stop" }));
    }
}

//! In-memory Preference Store
//!
//! Volatile store that logs every call and can be told to fail commits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{PreferenceStore, PreferenceValue};

/// A call made against the memory store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    PutFloat(String, f32),
    PutLong(String, i64),
    Commit,
}

#[derive(Default)]
struct Inner {
    committed: HashMap<String, PreferenceValue>,
    staged: Vec<(String, PreferenceValue)>,
    calls: Vec<StoreCall>,
}

/// Volatile preference store
#[derive(Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Inner>,
    fail_commits: AtomicBool,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent commits return false
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Seed a committed value
    pub fn insert(&self, key: &str, value: PreferenceValue) {
        self.inner.lock().committed.insert(key.to_string(), value);
    }

    /// Committed value for `key`
    pub fn committed(&self, key: &str) -> Option<PreferenceValue> {
        self.inner.lock().committed.get(key).copied()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, StoreCall::Commit))
            .count()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.committed(key) {
            Some(PreferenceValue::Float(v)) => v,
            Some(PreferenceValue::Long(v)) => v as f32,
            None => default,
        }
    }

    fn get_long(&self, key: &str, default: i64) -> i64 {
        match self.committed(key) {
            Some(PreferenceValue::Long(v)) => v,
            Some(PreferenceValue::Float(v)) => v as i64,
            None => default,
        }
    }

    fn put_float(&self, key: &str, value: f32) {
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::PutFloat(key.to_string(), value));
        inner.staged.push((key.to_string(), PreferenceValue::Float(value)));
    }

    fn put_long(&self, key: &str, value: i64) {
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::PutLong(key.to_string(), value));
        inner.staged.push((key.to_string(), PreferenceValue::Long(value)));
    }

    fn commit(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::Commit);
        if self.fail_commits.load(Ordering::SeqCst) {
            return false;
        }
        let staged = std::mem::take(&mut inner.staged);
        for (key, value) in staged {
            inner.committed.insert(key, value);
        }
        true
    }
}

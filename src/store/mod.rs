//! Preference Store Module
//!
//! Durable key-value storage for session state. Writes are staged with
//! `put_*` and only land when `commit` returns true; reads see committed
//! values.

mod memory;
mod sqlite;

pub use memory::{MemoryPreferenceStore, StoreCall};
pub use sqlite::{PreferenceEntry, SqlitePreferenceStore};

/// Elapsed session distance in meters (float)
pub const GPS_DISTANCE: &str = "GPS_DISTANCE";

/// Last session start, epoch milliseconds (integer)
pub const GPS_LAST_START: &str = "GPS_LAST_START";

/// A staged or stored preference value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreferenceValue {
    Float(f32),
    Long(i64),
}

/// Key-value store with synchronous commit
pub trait PreferenceStore: Send + Sync {
    /// Committed float value, or `default`
    fn get_float(&self, key: &str, default: f32) -> f32;

    /// Committed integer value, or `default`
    fn get_long(&self, key: &str, default: i64) -> i64;

    /// Stage a float write
    fn put_float(&self, key: &str, value: f32);

    /// Stage an integer write
    fn put_long(&self, key: &str, value: i64);

    /// Write all staged values; blocks until they land or fail
    fn commit(&self) -> bool;
}

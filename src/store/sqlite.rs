//! SQLite Preference Store
//!
//! Persistent storage for session preferences, backed by a single SQLite
//! table. Staged writes are applied in one transaction on commit.

use std::path::PathBuf;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{PreferenceStore, PreferenceValue};
use crate::error::{Error, Result};

/// A stored preference row
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceEntry {
    pub key: String,
    pub value: PreferenceValue,
    pub updated_at: String,
}

/// Persistent preference store backed by SQLite
pub struct SqlitePreferenceStore {
    /// Database connection
    conn: Mutex<Connection>,
    /// Writes waiting for the next commit
    staged: Mutex<Vec<(String, PreferenceValue)>>,
    /// Database file
    path: PathBuf,
}

impl SqlitePreferenceStore {
    /// Create or open the preferences database in `data_dir`
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("preferences.db");
        let conn = Connection::open(&db_path)?;

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;

            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value_real REAL,
                value_int INTEGER,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            staged: Mutex::new(Vec::new()),
            path: db_path,
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Apply staged writes, reporting the failure cause
    pub fn try_commit(&self) -> Result<()> {
        let mut staged = self.staged.lock();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for (key, value) in staged.iter() {
            match value {
                PreferenceValue::Float(v) => {
                    tx.execute(
                        r#"
                        INSERT INTO preferences (key, value_real, value_int) VALUES (?1, ?2, NULL)
                        ON CONFLICT(key) DO UPDATE SET value_real = ?2, value_int = NULL,
                            updated_at = CURRENT_TIMESTAMP
                        "#,
                        params![key, *v as f64],
                    )?;
                }
                PreferenceValue::Long(v) => {
                    tx.execute(
                        r#"
                        INSERT INTO preferences (key, value_real, value_int) VALUES (?1, NULL, ?2)
                        ON CONFLICT(key) DO UPDATE SET value_int = ?2, value_real = NULL,
                            updated_at = CURRENT_TIMESTAMP
                        "#,
                        params![key, v],
                    )?;
                }
            }
        }

        tx.commit()?;
        staged.clear();
        Ok(())
    }

    /// Read a committed value
    pub fn get(&self, key: &str) -> Result<Option<PreferenceValue>> {
        let conn = self.conn.lock();
        let row: Option<(Option<f64>, Option<i64>)> = conn
            .query_row(
                "SELECT value_real, value_int FROM preferences WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((Some(real), _)) => Some(PreferenceValue::Float(real as f32)),
            Some((None, Some(int))) => Some(PreferenceValue::Long(int)),
            _ => None,
        })
    }

    /// All committed preferences, ordered by key
    pub fn entries(&self) -> Result<Vec<PreferenceEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, value_real, value_int, updated_at FROM preferences ORDER BY key",
        )?;
        let rows = stmt.query_map([], |row| {
            let real: Option<f64> = row.get(1)?;
            let int: Option<i64> = row.get(2)?;
            let value = match real {
                Some(v) => PreferenceValue::Float(v as f32),
                None => PreferenceValue::Long(int.unwrap_or_default()),
            };
            Ok(PreferenceEntry {
                key: row.get(0)?,
                value,
                updated_at: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for result in rows {
            entries.push(result?);
        }

        Ok(entries)
    }

    /// Number of writes waiting for commit
    pub fn staged_count(&self) -> usize {
        self.staged.lock().len()
    }

    fn stage(&self, key: &str, value: PreferenceValue) {
        let mut staged = self.staged.lock();
        staged.retain(|(k, _)| k != key);
        staged.push((key.to_string(), value));
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.get(key) {
            Ok(Some(PreferenceValue::Float(v))) => v,
            Ok(Some(PreferenceValue::Long(v))) => v as f32,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", key, e);
                default
            }
        }
    }

    fn get_long(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Ok(Some(PreferenceValue::Long(v))) => v,
            Ok(Some(PreferenceValue::Float(v))) => v as i64,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", key, e);
                default
            }
        }
    }

    fn put_float(&self, key: &str, value: f32) {
        self.stage(key, PreferenceValue::Float(value));
    }

    fn put_long(&self, key: &str, value: i64) {
        self.stage(key, PreferenceValue::Long(value));
    }

    fn commit(&self) -> bool {
        match self.try_commit() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Preference commit to {:?} failed: {}", self.path, e);
                false
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::State(format!("SQLite error: {}", e))
    }
}

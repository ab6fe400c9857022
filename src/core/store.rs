//! Durable key-value store shared by the engine, the alert machine and the CLI.
//!
//! Values are kept as strings and parsed at the typed accessors, so a corrupted
//! entry surfaces as a persistence error instead of a silently wrong setting.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{NetMeterError, Result};

/// Persistent store contract.
///
/// Implementations must make `set_many` and `add_i64` atomic with respect to
/// every other call on the same store.
pub trait PreferenceStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    fn set_raw(&self, key: &str, value: &str) -> Result<()>;

    /// Write several entries as one unit.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Read-modify-write of an integer counter. Missing keys start at zero.
    /// Returns the stored value after the update.
    fn add_i64(&self, key: &str, delta: i64) -> Result<i64>;

    fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_raw(key)? {
            None => Ok(default),
            Some(raw) => match raw.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(NetMeterError::persistence(format!(
                    "invalid boolean for '{}': {}",
                    key, other
                ))),
            },
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_raw(key, if value { "true" } else { "false" })
    }

    fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get_raw(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                NetMeterError::persistence(format!("invalid float for '{}': {}", key, raw))
            }),
        }
    }

    fn set_f64(&self, key: &str, value: f64) -> Result<()> {
        self.set_raw(key, &value.to_string())
    }

    fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_raw(key)? {
            None => Ok(default),
            Some(raw) => parse_i64(key, &raw),
        }
    }

    fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_raw(key, &value.to_string())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get_raw(key)
    }
}

fn parse_i64(key: &str, raw: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|_| {
        NetMeterError::persistence(format!("invalid integer for '{}': {}", key, raw))
    })
}

/// SQLite-backed store used by the binary.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prefs (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Default database location: `<data dir>/netmeter/netmeter.db`.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| NetMeterError::config("Could not determine data directory"))?;

        Ok(data_dir.join("netmeter").join("netmeter.db"))
    }
}

const UPSERT: &str = "INSERT INTO prefs (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

impl PreferenceStore for SqliteStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM prefs WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(UPSERT, params![key, value])?;
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(UPSERT, params![key, value])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM prefs WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn add_i64(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let current = tx
            .query_row("SELECT value FROM prefs WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        let current = match current {
            Some(raw) => parse_i64(key, &raw)?,
            None => 0,
        };

        let updated = current.saturating_add(delta);
        tx.execute(UPSERT, params![key, updated.to_string()])?;
        tx.commit()?;

        Ok(updated)
    }
}

/// In-process store, used by tests and as a scratch store.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut values = self.values.lock();
        for (key, value) in entries {
            values.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    fn add_i64(&self, key: &str, delta: i64) -> Result<i64> {
        let mut values = self.values.lock();
        let current = match values.get(key) {
            Some(raw) => parse_i64(key, raw)?,
            None => 0,
        };
        let updated = current.saturating_add(delta);
        values.insert(key.to_string(), updated.to_string());
        Ok(updated)
    }
}

//! SQLite key-value channel

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Channel, ChannelError, ChannelResult};

/// Key-value records in a single SQLite table.
///
/// Several processes may open the same database; the busy timeout bounds how
/// long a write waits for another process's lock.
pub struct SqliteChannel {
    conn: Mutex<Connection>,
}

impl SqliteChannel {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> ChannelResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let channel = Self {
            conn: Mutex::new(conn),
        };
        channel.init_schema()?;
        Ok(channel)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> ChannelResult<Self> {
        let conn = Connection::open_in_memory()?;
        let channel = Self {
            conn: Mutex::new(conn),
        };
        channel.init_schema()?;
        Ok(channel)
    }

    fn conn(&self) -> ChannelResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChannelError::Unavailable("sqlite connection lock poisoned".into()))
    }

    fn init_schema(&self) -> ChannelResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Records (one row per key)
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Diagnostic log (append-only, trimmed)
            CREATE TABLE IF NOT EXISTS log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                line TEXT NOT NULL
            );
            "#,
        )?;

        debug!("SQLite channel schema initialized");
        Ok(())
    }
}

impl Channel for SqliteChannel {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn read(&self, key: &str) -> ChannelResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &[u8]) -> ChannelResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key)
            DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, mindful_util::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> ChannelResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
        Ok(())
    }

    fn create_exclusive(&self, key: &str, value: &[u8]) -> ChannelResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO kv (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, mindful_util::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    fn list(&self, prefix: &str) -> ChannelResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map([prefix], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn append_line(&self, line: &str, limit: usize) -> ChannelResult<()> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO log (line) VALUES (?)", [line])?;
        conn.execute(
            "DELETE FROM log WHERE id <= (SELECT MAX(id) FROM log) - ?",
            [limit as i64],
        )?;
        Ok(())
    }

    fn read_lines(&self, limit: usize) -> ChannelResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT line FROM log ORDER BY id DESC LIMIT ?")?;
        let rows = stmt.query_map([limit as i64], |row| row.get::<_, String>(0))?;

        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }

    fn is_available(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("SQLite connection lock poisoned");
                false
            }
        }
    }
}

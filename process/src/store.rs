use std::{path::Path, sync::Mutex};

use rusqlite::{params, Connection};

/// SQLite-backed sink for processed log records.
///
/// Handlers run on connection threads, so inserts are serialized behind a
/// mutex around the single database connection.
pub struct LogStore {
    conn: Mutex<Connection>,
}

impl LogStore {
    /// Open (or create) the database and ensure the schema exists.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                log_message TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one record.
    pub fn insert(&self, timestamp: &str, message: &str) -> rusqlite::Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO logs (timestamp, log_message) VALUES (?1, ?2)",
            params![timestamp, message],
        )?;
        Ok(())
    }

    /// Number of stored records.
    pub fn count(&self) -> rusqlite::Result<i64> {
        self.conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

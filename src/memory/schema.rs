use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;

pub(crate) fn config_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".config")
        .join("membot")
}

pub(crate) fn default_db_path() -> PathBuf {
    config_dir().join("memory.db")
}

/// Open a connection with WAL and a busy timeout so concurrent writers wait instead of failing.
pub(crate) fn open_db(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub(crate) fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_state (
            chat_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            memory_on INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );",
    )?;
    Ok(())
}

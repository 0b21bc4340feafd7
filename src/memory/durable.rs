use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use tracing::debug;

use super::schema::{init_schema, open_db};
use super::store::Identity;
use crate::error::AppError;

/// The durable part of a conversation: everything except the turn buffer.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StoredMemory {
    pub(crate) summary: String,
    pub(crate) memory_enabled: bool,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl Default for StoredMemory {
    fn default() -> Self {
        Self {
            summary: String::new(),
            memory_enabled: true,
            updated_at: None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub(crate) trait DurableStore: Send + Sync {
    fn init(&self) -> Result<(), AppError>;
    /// Defaults when no record exists.
    fn load(&self, identity: Identity) -> Result<StoredMemory, AppError>;
    fn save(&self, identity: Identity, summary: &str, memory_enabled: bool) -> Result<(), AppError>;
    fn delete(&self, identity: Identity) -> Result<(), AppError>;
}

/// SQLite-backed store. Each call opens its own connection, so several
/// processes can share one database file.
pub(crate) struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let store = Self { path: path.into() };
        store.init()?;
        Ok(store)
    }
}

impl DurableStore for SqliteStore {
    fn init(&self) -> Result<(), AppError> {
        let conn = open_db(&self.path)?;
        init_schema(&conn)
    }

    fn load(&self, identity: Identity) -> Result<StoredMemory, AppError> {
        let conn = open_db(&self.path)?;
        let row = conn
            .query_row(
                "SELECT summary, memory_on, updated_at FROM user_state
                 WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![identity.chat_id, identity.user_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(match row {
            Some((summary, memory_enabled, updated_at)) => StoredMemory {
                summary: summary.unwrap_or_default(),
                memory_enabled,
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
            },
            None => StoredMemory::default(),
        })
    }

    fn save(
        &self,
        identity: Identity,
        summary: &str,
        memory_enabled: bool,
    ) -> Result<(), AppError> {
        let conn = open_db(&self.path)?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        conn.execute(
            "INSERT INTO user_state (chat_id, user_id, summary, memory_on, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (chat_id, user_id) DO UPDATE SET
                summary = excluded.summary,
                memory_on = excluded.memory_on,
                updated_at = excluded.updated_at",
            rusqlite::params![identity.chat_id, identity.user_id, summary, memory_enabled, now],
        )?;
        debug!(identity = %identity, summary_len = summary.len(), memory_enabled, "Memory saved");
        Ok(())
    }

    fn delete(&self, identity: Identity) -> Result<(), AppError> {
        let conn = open_db(&self.path)?;
        let removed = conn.execute(
            "DELETE FROM user_state WHERE chat_id = ?1 AND user_id = ?2",
            rusqlite::params![identity.chat_id, identity.user_id],
        )?;
        debug!(identity = %identity, removed, "Memory deleted");
        Ok(())
    }
}

pub(crate) mod durable;
pub(crate) mod schema;
pub(crate) mod store;
pub(crate) mod summarizer;
pub(crate) mod turns;

// Re-export the public API so callers use `crate::memory::*`
pub(crate) use durable::{DurableStore, SqliteStore, StoredMemory};
pub(crate) use schema::default_db_path;
pub(crate) use store::{Identity, MemoryStore};
pub(crate) use summarizer::summarize;
pub(crate) use turns::{ChatMessage, Role};

#[cfg(test)]
pub(crate) use durable::MockDurableStore;

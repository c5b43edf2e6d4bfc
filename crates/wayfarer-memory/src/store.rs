//! Memory Store.
//!
//! Append-only SQLite persistence for [`Memory`] records.
//!
//! # Storage layout
//!
//! A single table `memories` is created (if it does not already exist):
//!
//! | column       | type    | description                              |
//! |--------------|---------|------------------------------------------|
//! | unique_id    | TEXT    | UUID v4 primary key                      |
//! | memory_type  | TEXT    | `regular`, `conversation`, `spatial`, …  |
//! | timestamp    | INTEGER | Creation time, seconds since the epoch   |
//! | text_content | TEXT    | The remembered fact                      |
//! | links        | TEXT    | JSON list of related memory ids          |
//!
//! Ids are enforced unique: appending a record whose id already exists is an
//! error and leaves the table untouched.
//!
//! Each agent process normally opens its own file via
//! [`MemoryStore::open_for_run`], so memories are isolated per run unless a
//! path is reused on purpose.
//!
//! # Example
//!
//! ```rust
//! use wayfarer_memory::store::MemoryStore;
//! use wayfarer_types::{Memory, MemoryType};
//!
//! let store = MemoryStore::open_in_memory().unwrap();
//! let memory = Memory::new(MemoryType::Action, "I walked west onto grass.");
//! store.append(&memory).unwrap();
//! assert_eq!(store.len().unwrap(), 1);
//! assert!(store.append(&memory).is_err());
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use wayfarer_types::{AgentError, Memory, MemoryType};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("a memory with id {0} already exists")]
    DuplicateId(Uuid),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AgentError {
    fn from(e: StorageError) -> Self {
        AgentError::Storage(e.to_string())
    }
}

/// SQLite-backed, append-only memory store.
pub struct MemoryStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        let store = Self {
            conn,
            path: Some(path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, path: None };
        store.init_schema()?;
        Ok(store)
    }

    /// Create a fresh database file under `dir` for this process run.
    pub fn open_for_run(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let short_id = Uuid::new_v4().simple().to_string();
        let name = format!(
            "memories-{}-{}.sqlite",
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            &short_id[..8]
        );
        let store = Self::open(dir.join(name))?;
        info!(path = ?store.path, "opened per-run memory store");
        Ok(store)
    }

    /// Backing file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                unique_id    TEXT NOT NULL PRIMARY KEY,
                memory_type  TEXT NOT NULL,
                timestamp    INTEGER NOT NULL,
                text_content TEXT NOT NULL,
                links        TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Persist one record.
    ///
    /// # Errors
    ///
    /// [`StorageError::DuplicateId`] if `memory.unique_id` is already
    /// stored; [`StorageError::Sqlite`] on any other write failure.
    pub fn append(&self, memory: &Memory) -> Result<(), StorageError> {
        let result = self.conn.execute(
            "INSERT INTO memories (unique_id, memory_type, timestamp, text_content, links)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                memory.unique_id.to_string(),
                memory.memory_type.as_str(),
                memory.timestamp,
                memory.text_content,
                memory.links,
            ],
        );
        match result {
            Ok(_) => {
                debug!(unique_id = %memory.unique_id, kind = memory.memory_type.as_str(), "memory appended");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::DuplicateId(memory.unique_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every stored record, oldest first.
    pub fn all(&self) -> Result<Vec<Memory>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT unique_id, memory_type, timestamp, text_content, links
             FROM memories
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], row_to_memory)?;
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    pub fn get(&self, unique_id: Uuid) -> Result<Option<Memory>, StorageError> {
        let memory = self
            .conn
            .query_row(
                "SELECT unique_id, memory_type, timestamp, text_content, links
                 FROM memories WHERE unique_id = ?1",
                params![unique_id.to_string()],
                row_to_memory,
            )
            .optional()?;
        Ok(memory)
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Return up to `limit` memories most related to `context`.
    ///
    /// Similarity ranking over stored embeddings is not implemented yet, so
    /// this always returns an empty list.  Callers can rely on the signature
    /// staying the same once ranking lands.
    pub fn retrieve_relevant(&self, context: &str, limit: usize) -> Result<Vec<Memory>, StorageError> {
        debug!(context_len = context.len(), limit, "memory retrieval requested (no ranking backend)");
        Ok(Vec::new())
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let id_str: String = row.get(0)?;
    let type_str: String = row.get(1)?;
    let unique_id = Uuid::parse_str(&id_str)
        .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text))?;
    let memory_type = type_str
        .parse::<MemoryType>()
        .map_err(|e| rusqlite::Error::InvalidColumnType(1, e, rusqlite::types::Type::Text))?;
    Ok(Memory {
        unique_id,
        memory_type,
        timestamp: row.get(2)?,
        text_content: row.get(3)?,
        links: row.get(4)?,
    })
}

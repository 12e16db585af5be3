//! Durable block record store
//!
//! One table mapping identity to its persona block handle. This local record
//! is authoritative: the upstream list-blocks capability is unreliable and is
//! never consulted for discovery.

use crate::error::StoreError;
use crate::identity::Identity;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use parlor_upstream::BlockId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persisted mapping from an identity to its remote persona block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Owning identity
    pub identity: Identity,
    /// Runtime-issued block id
    pub remote_block_id: BlockId,
    /// Block label upstream
    pub label: String,
    /// When the block content was last pushed upstream
    pub last_synced_at: DateTime<Utc>,
}

/// Storage seam for block records
///
/// Implementations must make `save` atomic per identity; callers serialize
/// create races above this layer.
pub trait BlockStore: Send + Sync + std::fmt::Debug {
    /// Load the record for an identity
    fn load(&self, identity: &Identity) -> Result<Option<BlockRecord>, StoreError>;

    /// Insert or overwrite a record
    fn save(&self, record: &BlockRecord) -> Result<(), StoreError>;

    /// Delete the record for an identity (explicit teardown only)
    fn remove(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Number of persisted records
    fn count(&self) -> Result<usize, StoreError>;
}

/// Sqlite-backed store
///
/// A single connection behind a mutex: record traffic is one row per
/// exchange, far below where connection pooling would matter.
#[derive(Debug)]
pub struct SqliteBlockStore {
    conn: Mutex<Connection>,
}

impl SqliteBlockStore {
    /// Open (and migrate) the store at the given path
    ///
    /// # Errors
    /// Returns `StoreError::Database` if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (tests, ephemeral deployments)
    ///
    /// # Errors
    /// Returns `StoreError::Database` if sqlite cannot allocate the store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS block_records (
                identity        TEXT PRIMARY KEY,
                remote_block_id TEXT NOT NULL,
                label           TEXT NOT NULL,
                last_synced_at  TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl BlockStore for SqliteBlockStore {
    fn load(&self, identity: &Identity) -> Result<Option<BlockRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT remote_block_id, label, last_synced_at
                 FROM block_records WHERE identity = ?1",
                params![identity.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((block_id, label, synced)) => {
                let last_synced_at = DateTime::parse_from_rfc3339(&synced)
                    .map_err(|e| StoreError::CorruptRecord {
                        identity: identity.to_string(),
                        detail: format!("last_synced_at: {e}"),
                    })?
                    .with_timezone(&Utc);
                Ok(Some(BlockRecord {
                    identity: identity.clone(),
                    remote_block_id: BlockId::new(block_id),
                    label,
                    last_synced_at,
                }))
            }
        }
    }

    fn save(&self, record: &BlockRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO block_records (identity, remote_block_id, label, last_synced_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(identity) DO UPDATE SET
                remote_block_id = excluded.remote_block_id,
                label = excluded.label,
                last_synced_at = excluded.last_synced_at",
            params![
                record.identity.as_str(),
                record.remote_block_id.as_str(),
                record.label,
                record.last_synced_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn remove(&self, identity: &Identity) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM block_records WHERE identity = ?1",
            params![identity.as_str()],
        )?;
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM block_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// In-memory store for tests
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    records: DashMap<Identity, BlockRecord>,
}

impl MemoryBlockStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn load(&self, identity: &Identity) -> Result<Option<BlockRecord>, StoreError> {
        Ok(self.records.get(identity).map(|r| r.clone()))
    }

    fn save(&self, record: &BlockRecord) -> Result<(), StoreError> {
        self.records.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, identity: &Identity) -> Result<(), StoreError> {
        self.records.remove(identity);
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(identity: &str, block: &str) -> BlockRecord {
        BlockRecord {
            identity: Identity::new(identity),
            remote_block_id: BlockId::new(block),
            label: "persona".to_string(),
            last_synced_at: Utc::now(),
        }
    }

    #[test]
    fn sqlite_round_trip() {
        let store = SqliteBlockStore::in_memory().unwrap();
        let rec = record("u1", "block-1");

        store.save(&rec).unwrap();
        let loaded = store.load(&Identity::new("u1")).unwrap().unwrap();
        assert_eq!(loaded.remote_block_id, rec.remote_block_id);
        assert_eq!(loaded.label, "persona");
        assert_eq!(
            loaded.last_synced_at.timestamp(),
            rec.last_synced_at.timestamp()
        );
    }

    #[test]
    fn sqlite_save_overwrites() {
        let store = SqliteBlockStore::in_memory().unwrap();
        store.save(&record("u1", "block-1")).unwrap();
        store.save(&record("u1", "block-2")).unwrap();

        let loaded = store.load(&Identity::new("u1")).unwrap().unwrap();
        assert_eq!(loaded.remote_block_id.as_str(), "block-2");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn sqlite_remove_deletes_row() {
        let store = SqliteBlockStore::in_memory().unwrap();
        store.save(&record("u1", "block-1")).unwrap();

        store.remove(&Identity::new("u1")).unwrap();
        assert!(store.load(&Identity::new("u1")).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn sqlite_load_missing_is_none() {
        let store = SqliteBlockStore::in_memory().unwrap();
        assert!(store.load(&Identity::new("ghost")).unwrap().is_none());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryBlockStore::new();
        let rec = record("u1", "block-1");

        store.save(&rec).unwrap();
        assert_eq!(store.load(&Identity::new("u1")).unwrap().unwrap(), rec);

        store.remove(&Identity::new("u1")).unwrap();
        assert!(store.load(&Identity::new("u1")).unwrap().is_none());
    }

    #[test]
    fn sqlite_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");

        {
            let store = SqliteBlockStore::open(&path).unwrap();
            store.save(&record("u1", "block-1")).unwrap();
        }

        let store = SqliteBlockStore::open(&path).unwrap();
        let loaded = store.load(&Identity::new("u1")).unwrap().unwrap();
        assert_eq!(loaded.remote_block_id.as_str(), "block-1");
    }
}

//! Storage backends for the chain
//!
//! Every backend stores the complete block sequence and replaces it wholesale
//! on each save; there is no incremental append at the storage layer.

use crate::blockchain::Block;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{ChainError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Abstraction for persistence backends.
pub trait Persistence: Send + Sync {
    /// Replaces the stored chain with `blocks`.
    fn save_chain(&self, blocks: &[Block]) -> Result<()>;
    /// `Ok(None)` when nothing has been stored yet.
    fn load_chain(&self) -> Result<Option<Vec<Block>>>;
    /// Short human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Opens the backend selected in `config`.
pub fn open_backend(config: &StorageConfig) -> Result<Box<dyn Persistence>> {
    Ok(match config.backend {
        StorageBackend::Json => Box::new(JsonFileStore::new(&config.path)),
        StorageBackend::Sqlite => Box::new(Database::open(&config.path)?),
        StorageBackend::Memory => Box::new(InMemoryPersistence::new()),
    })
}

/// Chain stored as a pretty-printed JSON array of flat block records.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStore {
    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        let json = serde_json::to_vec_pretty(blocks)?;

        // Write beside the target and rename over it, so readers never see a
        // half-written file.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| {
            ChainError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| ChainError::Storage(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ChainError::Storage(format!("Failed to write chain: {}", e)))?;
        tmp.persist(&self.path).map_err(|e| {
            ChainError::Storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&self.path).map_err(|e| {
            ChainError::Storage(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let blocks: Vec<Block> = serde_json::from_slice(&raw)?;
        Ok(Some(blocks))
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// SQLite-backed store, one row per block.
pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

fn to_sql_int(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| ChainError::Database(format!("{} {} does not fit in SQLite INTEGER", field, value)))
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                idx INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                url TEXT NOT NULL,
                hash_summary TEXT NOT NULL,
                author TEXT NOT NULL,
                validator TEXT NOT NULL,
                tags TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                nonce INTEGER NOT NULL,
                hash TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::Database(format!("Failed to create blocks table: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
            path: path.to_string(),
        })
    }

    pub fn block_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl Persistence for Database {
    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        let conn = self.conn.lock();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| ChainError::Database(format!("Failed to start transaction: {}", e)))?;

        tx.execute("DELETE FROM blocks", [])
            .map_err(|e| ChainError::Database(format!("Failed to clear blocks: {}", e)))?;

        for block in blocks {
            let tags = serde_json::to_string(&block.tags)?;
            tx.execute(
                "INSERT INTO blocks (idx, timestamp, url, hash_summary, author, validator, tags, previous_hash, nonce, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    to_sql_int(block.index, "index")?,
                    to_sql_int(block.timestamp, "timestamp")?,
                    block.url,
                    block.hash_summary,
                    block.author,
                    block.validator,
                    tags,
                    block.previous_hash,
                    to_sql_int(block.nonce, "nonce")?,
                    block.hash,
                ],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save block #{}: {}", block.index, e)))?;
        }

        // Commit all changes atomically
        tx.commit()
            .map_err(|e| ChainError::Database(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT idx, timestamp, url, hash_summary, author, validator, tags, previous_hash, nonce, hash
                 FROM blocks ORDER BY idx ASC",
            )
            .map_err(|e| ChainError::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let index: i64 = row.get(0)?;
                let timestamp: i64 = row.get(1)?;
                let tags: String = row.get(6)?;
                let nonce: i64 = row.get(8)?;
                Ok((
                    index,
                    timestamp,
                    tags,
                    nonce,
                    Block {
                        index: 0,
                        timestamp: 0,
                        url: row.get(2)?,
                        hash_summary: row.get(3)?,
                        author: row.get(4)?,
                        validator: row.get(5)?,
                        tags: Vec::new(),
                        previous_hash: row.get(7)?,
                        nonce: 0,
                        hash: row.get(9)?,
                    },
                ))
            })
            .map_err(|e| ChainError::Database(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (index, timestamp, tags, nonce, mut block) =
                row.map_err(|e| ChainError::Database(format!("Failed to load block: {}", e)))?;
            let from_sql = |value: i64, field: &str| {
                u64::try_from(value)
                    .map_err(|_| ChainError::Database(format!("negative {} {} in storage", field, value)))
            };
            block.index = from_sql(index, "index")?;
            block.timestamp = from_sql(timestamp, "timestamp")?;
            block.nonce = from_sql(nonce, "nonce")?;
            block.tags = serde_json::from_str(&tags)?;
            blocks.push(block);
        }

        if blocks.is_empty() {
            return Ok(None);
        }
        Ok(Some(blocks))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral
/// runs. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    blocks: Arc<Mutex<Option<Vec<Block>>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_len(&self) -> usize {
        self.blocks.lock().as_ref().map_or(0, Vec::len)
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        *self.blocks.lock() = Some(blocks.to_vec());
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        Ok(self.blocks.lock().clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::SourceEntry;
    use crate::miner::ProofOfWork;
    use tempfile::TempDir;

    fn sample_chain() -> Vec<Block> {
        let genesis = Block::genesis();
        let entry = SourceEntry::new(
            "http://x",
            "abc",
            "alice",
            "bob",
            vec!["t1".to_string(), "ünïcode".to_string()],
        );
        let mut block = Block::new(1, genesis.hash.clone(), entry);
        ProofOfWork::new(1).solve(&mut block).unwrap();
        vec![genesis, block]
    }

    fn assert_round_trip(store: &dyn Persistence) {
        assert_eq!(store.load_chain().unwrap(), None);

        let blocks = sample_chain();
        store.save_chain(&blocks).unwrap();
        let loaded = store.load_chain().unwrap().unwrap();

        assert_eq!(loaded, blocks);
        for block in &loaded {
            assert_eq!(block.recompute_hash(), block.hash);
        }
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));
        assert_round_trip(&store);
    }

    #[test]
    fn test_json_overwrites_whole_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/chain.json"));
        let blocks = sample_chain();

        store.save_chain(&blocks).unwrap();
        store.save_chain(&blocks[..1]).unwrap();
        assert_eq!(store.load_chain().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_json_records_are_flat() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));
        store.save_chain(&sample_chain()).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let record = &value.as_array().unwrap()[1];
        for key in [
            "index",
            "timestamp",
            "url",
            "hash_summary",
            "author",
            "validator",
            "tags",
            "previous_hash",
            "nonce",
            "hash",
        ] {
            assert!(record.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_json_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileStore::new(&path).load_chain().unwrap_err();
        assert!(matches!(err, ChainError::Serialization(_)));
    }

    #[test]
    fn test_sqlite_round_trip() {
        let db = Database::open(":memory:").unwrap();
        assert_round_trip(&db);
        assert_eq!(db.block_count().unwrap(), 2);

        db.save_chain(&sample_chain()[..1]).unwrap();
        assert_eq!(db.block_count().unwrap(), 1);
    }

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryPersistence::new();
        assert_round_trip(&store);
        assert_eq!(store.clone().stored_len(), 2);
    }

    #[test]
    fn test_open_backend_from_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.db");
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: path.to_string_lossy().into_owned(),
        };
        let store = open_backend(&config).unwrap();
        assert!(store.describe().starts_with("sqlite:"));
        assert_round_trip(store.as_ref());
    }
}

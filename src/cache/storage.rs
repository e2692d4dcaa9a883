//! Cache storage trait with SQLite and in-memory implementations.
//!
//! A storage holds named partitions; each partition maps a [`RequestKey`] to
//! a [`Response`] and remembers insertion order. `put` over an existing key
//! replaces the entry and moves it to the end of that order. Reads never
//! change it.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::request::{RequestKey, Response};

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open(&self, partition: &str) -> Result<()>;

  /// Whether a partition with this name exists.
  fn has(&self, partition: &str) -> Result<bool>;

  /// Names of all existing partitions.
  fn partition_names(&self) -> Result<Vec<String>>;

  /// Delete a partition and all of its entries. Returns false if it did not exist.
  fn delete_partition(&self, partition: &str) -> Result<bool>;

  /// Look up an entry. A missing partition is a miss.
  fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>>;

  /// Store an entry, creating the partition on first write.
  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Delete a single entry. Returns false if it was not present.
  fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool>;

  /// Keys of a partition, oldest insertion first.
  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>>;
}

impl<T: CacheStorage + ?Sized> CacheStorage for Box<T> {
  fn open(&self, partition: &str) -> Result<()> {
    (**self).open(partition)
  }

  fn has(&self, partition: &str) -> Result<bool> {
    (**self).has(partition)
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    (**self).partition_names()
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    (**self).delete_partition(partition)
  }

  fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>> {
    (**self).match_entry(partition, key)
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
    (**self).put(partition, key, response)
  }

  fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    (**self).delete_entry(partition, key)
  }

  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
    (**self).keys(partition)
  }
}

/// Partition contents kept in insertion order.
#[derive(Debug, Default)]
struct MemoryPartition {
  entries: Vec<(RequestKey, Response)>,
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  partitions: Mutex<BTreeMap<String, MemoryPartition>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn partitions(&self) -> Result<MutexGuard<'_, BTreeMap<String, MemoryPartition>>> {
    self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, partition: &str) -> Result<()> {
    self
      .partitions()?
      .entry(partition.to_string())
      .or_default();
    Ok(())
  }

  fn has(&self, partition: &str) -> Result<bool> {
    Ok(self.partitions()?.contains_key(partition))
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    Ok(self.partitions()?.keys().cloned().collect())
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    Ok(self.partitions()?.remove(partition).is_some())
  }

  fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>> {
    let partitions = self.partitions()?;
    Ok(
      partitions
        .get(partition)
        .and_then(|p| p.entries.iter().find(|(k, _)| k == key))
        .map(|(_, response)| response.clone()),
    )
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut partitions = self.partitions()?;
    let entries = &mut partitions.entry(partition.to_string()).or_default().entries;
    entries.retain(|(k, _)| k != key);
    entries.push((key.clone(), response.clone()));
    Ok(())
  }

  fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let mut partitions = self.partitions()?;
    let Some(p) = partitions.get_mut(partition) else {
      return Ok(false);
    };
    let before = p.entries.len();
    p.entries.retain(|(k, _)| k != key);
    Ok(p.entries.len() != before)
  }

  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
    let partitions = self.partitions()?;
    Ok(
      partitions
        .get(partition)
        .map(|p| p.entries.iter().map(|(k, _)| k.clone()).collect())
        .unwrap_or_default(),
    )
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    tracing::debug!(path = %path.display(), "opened cache database");
    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("connectome-offline").join("cache.db"))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- seq is AUTOINCREMENT so it never reuses values: it is the insertion order
CREATE TABLE IF NOT EXISTS entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (partition_name, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_partition_seq ON entries(partition_name, seq);
"#;

/// SHA256 of the request identity, for stable fixed-length keys.
fn key_hash(key: &RequestKey) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.to_string().as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, partition: &str) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to open partition {}: {}", partition, e))?;
    Ok(())
  }

  fn has(&self, partition: &str) -> Result<bool> {
    let found: Option<i64> = self
      .conn()?
      .query_row(
        "SELECT 1 FROM partitions WHERE name = ?",
        params![partition],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up partition {}: {}", partition, e))?;
    Ok(found.is_some())
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE partition_name = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", partition, e))?;
    let removed = tx
      .execute("DELETE FROM partitions WHERE name = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", partition, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>> {
    let row: Option<(u16, String, Vec<u8>)> = self
      .conn()?
      .query_row(
        "SELECT status, headers, body FROM entries WHERE partition_name = ? AND key_hash = ?",
        params![partition, key_hash(key)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", key, partition, e))?;

    match row {
      Some((status, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", key, e))?;
        Ok(Some(Response {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let hash = key_hash(key);

    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to open partition {}: {}", partition, e))?;

    // Delete first so the new row gets a fresh seq
    tx.execute(
      "DELETE FROM entries WHERE partition_name = ? AND key_hash = ?",
      params![partition, hash],
    )
    .map_err(|e| eyre!("Failed to replace entry: {}", e))?;

    tx.execute(
      "INSERT INTO entries (partition_name, key_hash, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        partition,
        hash,
        key.method,
        key.url,
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let removed = self
      .conn()?
      .execute(
        "DELETE FROM entries WHERE partition_name = ? AND key_hash = ?",
        params![partition, key_hash(key)],
      )
      .map_err(|e| eyre!("Failed to delete {} from {}: {}", key, partition, e))?;
    Ok(removed > 0)
  }

  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT method, url FROM entries WHERE partition_name = ? ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![partition], |row| {
        Ok(RequestKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", partition, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }
}

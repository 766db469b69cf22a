//! SQLite-backed plugin storage
//!
//! Every store a plugin opens is its own SQLite file under the storage
//! root, `<storage_dir>/<plugin>/<name>.db`, holding a single `kv` table.

use rusqlite::{params, Connection, OptionalExtension};
use scriptforge_plugin_api::host::{KeyValueStore, StorageEngine};
use scriptforge_runtime::{RuntimeError, RuntimeResult};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

fn storage_error(path: &Path, err: rusqlite::Error) -> RuntimeError {
    RuntimeError::Host(format!("storage {:?}: {}", path, err))
}

/// Storage engine opening one SQLite database per store.
#[derive(Debug, Default)]
pub struct SqliteStorage;

impl SqliteStorage {
    pub fn new() -> Self {
        Self
    }
}

impl StorageEngine for SqliteStorage {
    fn open(&self, path: &Path) -> RuntimeResult<Rc<dyn KeyValueStore>> {
        Ok(Rc::new(SqliteStore::open_at(path)?))
    }
}

/// A single key-value database.
pub struct SqliteStore {
    path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Open the database at a specific path, creating the schema if needed.
    pub fn open_at(path: &Path) -> RuntimeResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening plugin storage at: {:?}", path);
        let conn = Connection::open(path).map_err(|e| storage_error(path, e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )
        .map_err(|e| storage_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> RuntimeResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| storage_error(&self.path, e))
    }

    fn set(&self, key: &str, value: &str) -> RuntimeResult<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = datetime('now')",
                params![key, value],
            )
            .map_err(|e| storage_error(&self.path, e))?;
        debug!("Stored key '{}' in {:?}", key, self.path);
        Ok(())
    }

    fn remove(&self, key: &str) -> RuntimeResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| storage_error(&self.path, e))?;
        Ok(removed > 0)
    }

    fn keys(&self) -> RuntimeResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv ORDER BY key")
            .map_err(|e| storage_error(&self.path, e))?;
        let keys = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| storage_error(&self.path, e))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| storage_error(&self.path, e))?;
        Ok(keys)
    }
}

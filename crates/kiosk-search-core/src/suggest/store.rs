//! Persistence boundary for history and popularity entries.

use crate::error::{Result, SearchError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Minimal list store the ranker persists through.
///
/// Implementations must return entries in the order they were saved.
pub trait EntryStore<T>: Send + Sync {
    fn load(&self) -> Result<Vec<T>>;
    fn save(&self, entries: &[T]) -> Result<()>;
}

/// In-process store, mostly for tests and ephemeral kiosks.
#[derive(Debug)]
pub struct MemoryEntryStore<T> {
    entries: Mutex<Vec<T>>,
}

impl<T> Default for MemoryEntryStore<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T> MemoryEntryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Clone + Send> EntryStore<T> for MemoryEntryStore<T> {
    fn load(&self) -> Result<Vec<T>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, entries: &[T]) -> Result<()> {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries.to_vec();
        Ok(())
    }
}

/// SQLite store keeping one JSON list per namespace.
///
/// Thread-safe via internal mutex on the connection. Stores opened with
/// [`namespace`](Self::namespace) share the connection.
#[derive(Clone)]
pub struct SqliteEntryStore {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
}

impl SqliteEntryStore {
    /// Open (or create) a store database and select `namespace`.
    pub fn open(db_path: impl AsRef<Path>, namespace: impl Into<String>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SearchError::Io {
                    message: format!("Failed to create store directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| SearchError::Database {
            message: format!("Failed to open store database: {}", e),
            source: Some(e),
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| SearchError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn, namespace)
    }

    pub fn open_in_memory(namespace: impl Into<String>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, namespace)
    }

    fn from_connection(conn: Connection, namespace: impl Into<String>) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stored_entries (
                namespace TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| SearchError::Database {
            message: format!("Failed to initialize store schema: {}", e),
            source: Some(e),
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            namespace: namespace.into(),
        })
    }

    /// Another namespace on the same database.
    pub fn namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            namespace: namespace.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_payload(&self) -> Result<Option<String>> {
        let payload = self
            .lock()
            .query_row(
                "SELECT payload FROM stored_entries WHERE namespace = ?1",
                params![self.namespace],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }
}

impl<T> EntryStore<T> for SqliteEntryStore
where
    T: Serialize + DeserializeOwned,
{
    /// Entries that fail to decode are dropped with a warning.
    fn load(&self) -> Result<Vec<T>> {
        let Some(payload) = self.load_payload()? else {
            return Ok(Vec::new());
        };

        let items = match serde_json::from_str::<Value>(&payload) {
            Ok(Value::Array(items)) => items,
            Ok(_) | Err(_) => {
                warn!("Stored {} payload is not a JSON list, discarding", self.namespace);
                return Ok(Vec::new());
            }
        };

        let total = items.len();
        let entries: Vec<T> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Discarding malformed {} entry: {}", self.namespace, e);
                    None
                }
            })
            .collect();

        debug!(
            "Loaded {}/{} {} entries",
            entries.len(),
            total,
            self.namespace
        );
        Ok(entries)
    }

    fn save(&self, entries: &[T]) -> Result<()> {
        let payload = serde_json::to_string(entries)?;
        self.lock().execute(
            "INSERT OR REPLACE INTO stored_entries (namespace, payload, updated_at)
             VALUES (?1, ?2, ?3)",
            params![self.namespace, payload, Utc::now().to_rfc3339()],
        )?;
        debug!("Saved {} {} entries", entries.len(), self.namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        count: u32,
    }

    fn item(name: &str, count: u32) -> Item {
        Item {
            name: name.into(),
            count,
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryEntryStore::new();
        assert!(EntryStore::<Item>::load(&store).unwrap().is_empty());
        store.save(&[item("a", 1), item("b", 2)]).unwrap();
        assert_eq!(store.load().unwrap(), vec![item("a", 1), item("b", 2)]);
    }

    #[test]
    fn test_sqlite_store_keeps_order_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.db");

        let store = SqliteEntryStore::open(&path, "history").unwrap();
        EntryStore::<Item>::save(&store, &[item("z", 1), item("a", 2)]).unwrap();
        drop(store);

        let store = SqliteEntryStore::open(&path, "history").unwrap();
        let loaded: Vec<Item> = store.load().unwrap();
        assert_eq!(loaded, vec![item("z", 1), item("a", 2)]);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = SqliteEntryStore::open_in_memory("history").unwrap();
        let other = store.namespace("popularity");
        EntryStore::<Item>::save(&store, &[item("a", 1)]).unwrap();

        let loaded: Vec<Item> = other.load().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_malformed_entries_are_discarded() {
        let store = SqliteEntryStore::open_in_memory("history").unwrap();
        store
            .lock()
            .execute(
                "INSERT INTO stored_entries VALUES ('history', ?1, 'now')",
                [r#"[{"name":"ok","count":1},{"name":"bad"},42]"#],
            )
            .unwrap();

        let loaded: Vec<Item> = store.load().unwrap();
        assert_eq!(loaded, vec![item("ok", 1)]);
    }

    #[test]
    fn test_non_list_payload_is_discarded() {
        let store = SqliteEntryStore::open_in_memory("history").unwrap();
        store
            .lock()
            .execute(
                "INSERT INTO stored_entries VALUES ('history', 'not json', 'now')",
                [],
            )
            .unwrap();

        let loaded: Vec<Item> = store.load().unwrap();
        assert!(loaded.is_empty());
    }
}

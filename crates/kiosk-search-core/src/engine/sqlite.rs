//! SQLite-backed query executor.

use super::{FtsConfig, FtsManager, QueryExecutor, Row};
use crate::config::CompilerDefaults;
use crate::error::{Result, SearchError};
use crate::filter::{ContentType, FilterValue};
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

impl ToSql for FilterValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            FilterValue::Boolean(b) => Ok(ToSqlOutput::from(i64::from(*b))),
            FilterValue::Integer(n) => Ok(ToSqlOutput::from(*n)),
            FilterValue::Number(n) => Ok(ToSqlOutput::from(*n)),
            FilterValue::Date(d) => Ok(ToSqlOutput::from(d.format(CompilerDefaults::DATE_FORMAT).to_string())),
            FilterValue::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
        }
    }
}

/// Runs compiled queries against a SQLite database.
///
/// Thread-safe via an internal mutex on the connection. Calls are
/// synchronous inside the async methods, matching rusqlite's API.
#[derive(Clone)]
pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteExecutor {
    /// Open (or create) a database file.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SearchError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| SearchError::Database {
            message: format!("Failed to open database {}: {}", db_path.display(), e),
            source: Some(e),
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;

        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SearchError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Run statements that return no rows, such as schema setup.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    /// Borrow the connection for setup work that needs the raw API.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Create the `<table>_fts` index over the given text fields if missing.
    pub fn ensure_fts_table(&self, content_type: ContentType, fields: &[&str]) -> Result<()> {
        let config = FtsConfig::for_content_type(content_type, fields)?;
        self.with_connection(|conn| FtsManager::new(&config).ensure_setup(conn))
    }

    /// Engine failures while preparing or stepping a statement, including
    /// FTS5 match syntax errors, surface as [`SearchError::Execution`].
    fn query_rows(conn: &Connection, sql: &str, params: &[FilterValue]) -> Result<Vec<Row>> {
        let failed = |e: rusqlite::Error| SearchError::Execution {
            message: format!("{} (in: {})", e, sql),
        };

        let mut stmt = conn.prepare(sql).map_err(failed)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let mut rows = stmt.query(params_refs.as_slice()).map_err(failed)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(failed)? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), value_to_json(row.get_ref(i).map_err(failed)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::from(n),
        ValueRef::Real(n) => Value::from(n),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(&self, sql: &str, params: &[FilterValue]) -> Result<Vec<Row>> {
        let conn = self.lock()?;
        let rows = Self::query_rows(&conn, sql, params)?;
        debug!("Query returned {} rows", rows.len());
        Ok(rows)
    }

    async fn explain(&self, sql: &str, params: &[FilterValue]) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let rows = Self::query_rows(&conn, &format!("EXPLAIN QUERY PLAN {}", sql), params)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("detail").and_then(Value::as_str).map(String::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> SqliteExecutor {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        executor
            .execute_batch(
                "CREATE TABLE alumni (id INTEGER PRIMARY KEY, city TEXT, graduation_year INTEGER, photo BLOB);
                 INSERT INTO alumni (city, graduation_year, photo) VALUES ('Boston', 2020, x'ff00');
                 INSERT INTO alumni (city, graduation_year, photo) VALUES ('NY', 2020, NULL);",
            )
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_execute_binds_params() {
        let executor = executor();
        let rows = executor
            .execute(
                "SELECT city, graduation_year, photo FROM alumni WHERE city = ? AND graduation_year >= ?",
                &[FilterValue::Text("Boston".into()), FilterValue::Number(2019.5)],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["city"], "Boston");
        assert_eq!(rows[0]["graduation_year"], 2020);
        assert_eq!(rows[0]["photo"], "ff00");
    }

    #[tokio::test]
    async fn test_explain_reports_scan() {
        let executor = executor();
        let plan = executor
            .explain("SELECT * FROM alumni WHERE city = ?", &["Boston".into()])
            .await
            .unwrap();
        assert!(plan.iter().any(|line| line.contains("SCAN")));
    }

    #[tokio::test]
    async fn test_bad_sql_is_execution_error() {
        let executor = executor();
        let err = executor.execute("SELECT * FROM nowhere", &[]).await.unwrap_err();
        assert!(matches!(err, SearchError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_fts_leading_wildcard_is_execution_error() {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        executor
            .execute_batch(
                "CREATE TABLE publications (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
                 INSERT INTO publications (title) VALUES ('Torts in the Digital Age');",
            )
            .unwrap();
        executor
            .ensure_fts_table(ContentType::Publications, &["title"])
            .unwrap();

        let compiler = crate::compiler::QueryCompiler::new();
        let prefix = compiler
            .compile(
                &crate::filter::FilterModel::new(ContentType::Publications)
                    .with_text("title", "tort", crate::filter::MatchType::StartsWith),
            )
            .unwrap();
        let rows = executor.execute(&prefix.text, &prefix.params).await.unwrap();
        assert_eq!(rows.len(), 1);

        let contains = compiler
            .compile(
                &crate::filter::FilterModel::new(ContentType::Publications)
                    .with_text("title", "digital", crate::filter::MatchType::Contains),
            )
            .unwrap();
        let err = executor
            .execute(&contains.text, &contains.params)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Execution { .. }), "{:?}", err);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/search.db");
        SqliteExecutor::open(&path).unwrap();
        assert!(path.exists());
    }
}

//! Boundary to the relational engine that runs compiled queries.
//!
//! The core never executes SQL itself; it hands [`CompiledQuery`] text and
//! parameters to a [`QueryExecutor`]. [`SqliteExecutor`] is the bundled
//! adapter (SQLite with FTS5).
//!
//! [`CompiledQuery`]: crate::compiler::CompiledQuery

mod fts;
mod sqlite;

pub use fts::{FtsConfig, FtsManager, FtsStats};
pub use sqlite::SqliteExecutor;

use crate::error::Result;
use crate::filter::FilterValue;
use async_trait::async_trait;

/// A result row, column name → value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Executes compiled SQL and reports query plans.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a query, binding `params` to its placeholders in order.
    async fn execute(&self, sql: &str, params: &[FilterValue]) -> Result<Vec<Row>>;

    /// Return the engine's plan description for a query, one line per step.
    async fn explain(&self, sql: &str, params: &[FilterValue]) -> Result<Vec<String>>;
}

//! Kiosk Search Core - filter compilation, query caching and suggestion
//! ranking for the kiosk's search screens.
//!
//! The crate turns a structured [`FilterModel`] (or a visual-builder
//! [`FilterNode`] tree) into parameterized SQL, runs it through a
//! [`QueryOptimizer`] that deduplicates statements and caches results, and
//! ranks autocomplete [`Suggestion`]s from search history.
//!
//! Query execution is delegated to a [`QueryExecutor`]; [`SqliteExecutor`]
//! is the bundled SQLite/FTS5 adapter.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiosk_search::{ContentType, FilterModel, MatchType, QueryOptimizer, SqliteExecutor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> kiosk_search::Result<()> {
//!     let executor = Arc::new(SqliteExecutor::open("/path/to/kiosk.db")?);
//!     let optimizer = QueryOptimizer::new(executor);
//!
//!     let filter = FilterModel::new(ContentType::Alumni)
//!         .with_text("city", "Boston", MatchType::Equals)
//!         .with_range("graduationYear", 2015.0, 2025.0);
//!
//!     let rows = optimizer.search(&filter).await?;
//!     println!("Found {} alumni", rows.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod optimizer;
pub mod suggest;

// Re-export commonly used types
pub use cache::{generate_key, CacheEntry, CacheStats, ResultCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compiler::{CompiledQuery, QueryCompiler};
pub use config::{CacheConfig, OptimizerConfig, RankerConfig, SearchConfig};
pub use engine::{QueryExecutor, Row, SqliteExecutor};
pub use error::{Result, SearchError};
pub use filter::{
    validate, validate_value, ContentType, DatePreset, FilterModel, FilterNode, FilterValue,
    LogicalOperator, MatchType, ValidationResult,
};
pub use optimizer::{optimize, OptimizerStats, PreparedStatement, QueryOptimizer, QueryPlan};
pub use suggest::{
    EntryStore, HistoryEntry, MemoryEntryStore, PopularityEntry, SqliteEntryStore, Suggestion,
    SuggestionKind, SuggestionRanker,
};

//! Error types for the kiosk search core.
//!
//! Validation problems are not errors: they are collected into a
//! [`ValidationResult`](crate::filter::ValidationResult). Plan analysis and
//! persisted-payload failures are recovered where they happen and only logged.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the kiosk search core.
#[derive(Debug, Error)]
pub enum SearchError {
    // Compilation errors
    #[error("Cannot combine {found} filters with {expected} filters in one query")]
    IncompatibleContentTypes { expected: String, found: String },

    #[error("Invalid field name: {field:?}")]
    InvalidField { field: String },

    // Statement table errors
    #[error("Prepared statement not found: {id}")]
    StatementNotFound { id: String },

    // External engine errors
    #[error("Query execution failed: {message}")]
    Execution { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for kiosk search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(err: rusqlite::Error) -> Self {
        SearchError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SearchError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SearchError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error aborted a compilation.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            SearchError::IncompatibleContentTypes { .. } | SearchError::InvalidField { .. }
        )
    }
}

//! FTS5 shadow-table setup for content tables.
//!
//! Each searchable content table `<t>` gets an external-content FTS5 table
//! `<t>_fts` indexing the text columns, kept in sync by triggers. The
//! compiler's `MATCH` expressions and `rowid` joins target these tables.

use crate::config::CompilerDefaults;
use crate::error::{Result, SearchError};
use crate::filter::{column_name, ContentType};
use rusqlite::Connection;
use tracing::{debug, info};

/// Configuration for one FTS5 shadow table.
#[derive(Debug, Clone)]
pub struct FtsConfig {
    /// Content table the index mirrors.
    pub content_table: String,
    /// Text columns to index (snake_case column names).
    pub columns: Vec<String>,
    /// Tokenizer configuration.
    pub tokenizer: String,
}

impl FtsConfig {
    /// Index the given fields of a content type's table.
    ///
    /// Field names may be given in camelCase; they are mapped to columns.
    pub fn for_content_type(content_type: ContentType, fields: &[&str]) -> Result<Self> {
        let columns = fields
            .iter()
            .map(|field| {
                column_name(field).ok_or_else(|| SearchError::InvalidField {
                    field: field.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            content_table: content_type.table_name().to_string(),
            columns,
            tokenizer: CompilerDefaults::FTS_TOKENIZER.to_string(),
        })
    }

    pub fn fts_table(&self) -> String {
        format!("{}_fts", self.content_table)
    }
}

/// Manager for FTS5 setup and maintenance.
pub struct FtsManager<'a> {
    config: &'a FtsConfig,
}

impl<'a> FtsManager<'a> {
    pub fn new(config: &'a FtsConfig) -> Self {
        Self { config }
    }

    /// Check if the FTS5 table exists.
    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [self.config.fts_table()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Check if the sync triggers exist.
    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool> {
        let trigger_name = format!("{}_ai", self.config.fts_table());
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name=?1",
            [&trigger_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create the table and triggers if missing, indexing existing rows.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
            self.populate(conn)?;
        } else if !self.triggers_exist(conn)? {
            // Table exists but triggers missing, contents may be stale
            self.populate(conn)?;
        }

        self.create_triggers(conn)?;
        Ok(())
    }

    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({}, content='{}', tokenize='{}')",
            self.config.fts_table(),
            self.config.columns.join(", "),
            self.config.content_table,
            self.config.tokenizer
        );

        conn.execute(&sql, [])?;
        info!("Created FTS5 table: {}", self.config.fts_table());
        Ok(())
    }

    /// Create triggers that mirror inserts, updates and deletes.
    pub fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let fts = self.config.fts_table();
        let content = &self.config.content_table;
        let columns = self.config.columns.join(", ");
        let new_values = self.prefixed("new");
        let old_values = self.prefixed("old");

        let insert_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_ai AFTER INSERT ON {content} BEGIN
                INSERT INTO {fts} (rowid, {columns}) VALUES (new.rowid, {new_values});
            END"
        );
        conn.execute(&insert_trigger, [])?;

        let delete_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_ad AFTER DELETE ON {content} BEGIN
                INSERT INTO {fts} ({fts}, rowid, {columns}) VALUES ('delete', old.rowid, {old_values});
            END"
        );
        conn.execute(&delete_trigger, [])?;

        let update_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_au AFTER UPDATE ON {content} BEGIN
                INSERT INTO {fts} ({fts}, rowid, {columns}) VALUES ('delete', old.rowid, {old_values});
                INSERT INTO {fts} (rowid, {columns}) VALUES (new.rowid, {new_values});
            END"
        );
        conn.execute(&update_trigger, [])?;

        debug!("Created FTS5 triggers for {}", fts);
        Ok(())
    }

    fn prefixed(&self, prefix: &str) -> String {
        self.config
            .columns
            .iter()
            .map(|c| format!("{}.{}", prefix, c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Re-read the content table into the index.
    pub fn populate(&self, conn: &Connection) -> Result<()> {
        let fts = self.config.fts_table();
        conn.execute(&format!("INSERT INTO {fts}({fts}) VALUES('rebuild')"), [])?;
        info!("Populated {} from {}", fts, self.config.content_table);
        Ok(())
    }

    /// Drop and recreate the index, triggers included.
    pub fn rebuild(&self, conn: &Connection) -> Result<()> {
        let fts = self.config.fts_table();
        for suffix in ["ai", "au", "ad"] {
            conn.execute(&format!("DROP TRIGGER IF EXISTS {}_{}", fts, suffix), [])?;
        }
        conn.execute(&format!("DROP TABLE IF EXISTS {}", fts), [])?;

        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate(conn)?;

        info!("Rebuilt FTS5 index {}", fts);
        Ok(())
    }

    /// Merge index segments.
    pub fn optimize(&self, conn: &Connection) -> Result<()> {
        let fts = self.config.fts_table();
        conn.execute(&format!("INSERT INTO {fts}({fts}) VALUES('optimize')"), [])?;
        debug!("Optimized FTS5 index {}", fts);
        Ok(())
    }

    pub fn stats(&self, conn: &Connection) -> Result<FtsStats> {
        let row_count: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.config.fts_table()),
            [],
            |row| row.get(0),
        )?;

        Ok(FtsStats {
            table_name: self.config.fts_table(),
            row_count,
            tokenizer: self.config.tokenizer.clone(),
        })
    }
}

/// Statistics about an FTS5 index.
#[derive(Debug, Clone)]
pub struct FtsStats {
    pub table_name: String,
    pub row_count: usize,
    pub tokenizer: String,
}

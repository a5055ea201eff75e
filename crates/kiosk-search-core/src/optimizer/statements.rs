//! Prepared statement table.

use crate::config::OptimizerDefaults;
use crate::filter::FilterValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

static FROM_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\s+([A-Za-z_][A-Za-z0-9_]*)").expect("static regex"));

/// A registered query body, shared by every compile that optimizes to the
/// same text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedStatement {
    pub id: String,
    pub text: String,
    /// Parameters of the most recent prepare.
    pub params: Vec<FilterValue>,
    /// Registration time, epoch milliseconds.
    pub created_at: u64,
    pub use_count: u64,
}

impl PreparedStatement {
    /// Main table the statement reads from.
    pub fn table(&self) -> Option<&str> {
        FROM_TABLE
            .captures(&self.text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Deterministic id for optimized statement text.
pub fn statement_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex = hex::encode(digest);
    format!("stmt_{}", &hex[..OptimizerDefaults::STATEMENT_HASH_LEN])
}

/// Id → statement map behind a read-write lock.
#[derive(Debug, Default)]
pub(crate) struct StatementTable {
    statements: RwLock<HashMap<String, PreparedStatement>>,
}

impl StatementTable {
    /// Register `text` or bump the use count of its existing statement.
    pub fn prepare(&self, text: String, params: Vec<FilterValue>, now: u64) -> PreparedStatement {
        let id = statement_id(&text);
        let mut statements = self
            .statements
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let statement = statements
            .entry(id.clone())
            .and_modify(|existing| {
                existing.use_count += 1;
                existing.params = params.clone();
            })
            .or_insert_with(|| {
                debug!("Registered prepared statement {}", id);
                PreparedStatement {
                    id: id.clone(),
                    text,
                    params,
                    created_at: now,
                    use_count: 1,
                }
            });
        statement.clone()
    }

    pub fn get(&self, id: &str) -> Option<PreparedStatement> {
        self.statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// All statements, most used first.
    pub fn all(&self) -> Vec<PreparedStatement> {
        let mut all: Vec<_> = self
            .statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop statements older than `max_age` that were used exactly once.
    pub fn prune(&self, max_age: Duration, now: u64) -> usize {
        let max_age = max_age.as_millis() as u64;
        let mut statements = self
            .statements
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = statements.len();
        statements.retain(|_, s| !(s.use_count == 1 && now.saturating_sub(s.created_at) > max_age));
        let removed = before - statements.len();
        if removed > 0 {
            info!("Pruned {} single-use prepared statements", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = statement_id("SELECT alumni.* FROM alumni WHERE 1=1");
        assert_eq!(a, statement_id("SELECT alumni.* FROM alumni WHERE 1=1"));
        assert_ne!(a, statement_id("SELECT photos.* FROM photos WHERE 1=1"));
        assert!(a.starts_with("stmt_"));
        assert_eq!(a.len(), "stmt_".len() + 16);
    }

    #[test]
    fn test_prepare_shares_statement() {
        let table = StatementTable::default();
        let first = table.prepare("SELECT 1".into(), vec![FilterValue::Integer(1)], 10);
        let second = table.prepare("SELECT 1".into(), vec![FilterValue::Integer(2)], 20);

        assert_eq!(first.id, second.id);
        assert_eq!(second.use_count, 2);
        assert_eq!(second.created_at, 10);
        assert_eq!(second.params, vec![FilterValue::Integer(2)]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_prune_only_single_use_and_old() {
        let table = StatementTable::default();
        table.prepare("SELECT a FROM t".into(), vec![], 0);
        table.prepare("SELECT b FROM t".into(), vec![], 0);
        table.prepare("SELECT b FROM t".into(), vec![], 0);
        table.prepare("SELECT c FROM t".into(), vec![], 9_000);

        let removed = table.prune(Duration::from_secs(5), 10_000);
        assert_eq!(removed, 1);
        assert!(table.get(&statement_id("SELECT a FROM t")).is_none());
        assert!(table.get(&statement_id("SELECT b FROM t")).is_some());
        assert!(table.get(&statement_id("SELECT c FROM t")).is_some());
    }

    #[test]
    fn test_table_extraction() {
        let table = StatementTable::default();
        let stmt = table.prepare(
            "SELECT alumni.* FROM alumni LEFT JOIN (SELECT rowid FROM alumni_fts) AS h".into(),
            vec![],
            0,
        );
        assert_eq!(stmt.table(), Some("alumni"));
    }
}

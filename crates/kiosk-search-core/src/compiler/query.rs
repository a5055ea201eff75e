//! Compiled query text and the intermediate form it is rendered from.

use crate::filter::{ContentType, FilterValue, LogicalOperator};
use serde::{Deserialize, Serialize};

/// Condition text used when nothing constrains the query.
pub const ALWAYS_TRUE: &str = "1=1";

/// Parameterized SQL handed to the external engine.
///
/// `params[i]` binds the i-th `?` in `text`, left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub text: String,
    pub params: Vec<FilterValue>,
}

impl CompiledQuery {
    pub fn new(text: impl Into<String>, params: Vec<FilterValue>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    pub fn always_true() -> Self {
        Self::new(ALWAYS_TRUE, Vec::new())
    }

    pub fn is_always_true(&self) -> bool {
        self.text.trim() == ALWAYS_TRUE
    }

    /// Number of `?` placeholders outside quoted literals.
    pub fn placeholder_count(&self) -> usize {
        count_placeholders(&self.text)
    }
}

pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '?' => count += 1,
            None => {}
        }
    }
    count
}

/// One comparison and the values it binds.
#[derive(Debug, Clone)]
pub(crate) struct Clause {
    pub sql: String,
    pub params: Vec<FilterValue>,
}

/// The parts of a flat filter before rendering.
///
/// SELECT, WHERE-body and COUNT renderings all come from the same parts so the
/// count never has to be derived from rendered SQL.
#[derive(Debug, Clone)]
pub(crate) struct QueryParts {
    pub content_type: ContentType,
    pub operator: LogicalOperator,
    pub match_expression: Option<String>,
    pub clauses: Vec<Clause>,
}

impl QueryParts {
    fn hits_alias(&self) -> String {
        format!("{}_hits", self.content_type.fts_table_name())
    }

    fn join_conditions(&self, mut conditions: Vec<String>) -> String {
        if conditions.is_empty() {
            return ALWAYS_TRUE.to_string();
        }
        if conditions.len() == 1 {
            return conditions.remove(0);
        }
        conditions.join(&format!(" {} ", self.operator.as_sql()))
    }

    fn clause_params(&self) -> impl Iterator<Item = FilterValue> + '_ {
        self.clauses.iter().flat_map(|c| c.params.iter().cloned())
    }

    /// Full SELECT. A match expression adds a relevance column joined from
    /// the full-text relation; its bind value always comes first.
    pub fn select(&self) -> CompiledQuery {
        let table = self.content_type.table_name();
        let mut params = Vec::new();
        let mut conditions = Vec::new();

        let text = match &self.match_expression {
            Some(expression) => {
                let fts = self.content_type.fts_table_name();
                let hits = self.hits_alias();
                params.push(FilterValue::Text(expression.clone()));
                conditions.push(format!("{}.fts_rowid IS NOT NULL", hits));
                conditions.extend(self.clauses.iter().map(|c| c.sql.clone()));
                params.extend(self.clause_params());
                format!(
                    "SELECT {table}.*, {hits}.relevance AS relevance FROM {table} \
                     LEFT JOIN (SELECT rowid AS fts_rowid, bm25({fts}) AS relevance \
                     FROM {fts} WHERE {fts} MATCH ?) AS {hits} ON {hits}.fts_rowid = {table}.rowid \
                     WHERE {where_body} ORDER BY relevance IS NULL, relevance",
                    table = table,
                    hits = hits,
                    fts = fts,
                    where_body = self.join_conditions(conditions),
                )
            }
            None => {
                conditions.extend(self.clauses.iter().map(|c| c.sql.clone()));
                params.extend(self.clause_params());
                format!(
                    "SELECT {table}.* FROM {table} WHERE {}",
                    self.join_conditions(conditions),
                    table = table
                )
            }
        };

        CompiledQuery::new(text, params)
    }

    /// Self-contained condition usable inside a larger WHERE clause.
    pub fn where_body(&self) -> CompiledQuery {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(expression) = &self.match_expression {
            let fts = self.content_type.fts_table_name();
            conditions.push(format!(
                "{}.rowid IN (SELECT rowid FROM {} WHERE {} MATCH ?)",
                self.content_type.table_name(),
                fts,
                fts
            ));
            params.push(FilterValue::Text(expression.clone()));
        }
        conditions.extend(self.clauses.iter().map(|c| c.sql.clone()));
        params.extend(self.clause_params());

        CompiledQuery::new(self.join_conditions(conditions), params)
    }

    /// `SELECT COUNT(*)` over the same predicates.
    pub fn count(&self) -> CompiledQuery {
        let body = self.where_body();
        let table = self.content_type.table_name();
        CompiledQuery::new(
            format!("SELECT COUNT(*) AS count FROM {} WHERE {}", table, body.text),
            body.params,
        )
    }
}

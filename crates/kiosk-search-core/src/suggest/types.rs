//! Suggestion and history types.

use crate::filter::FilterModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a suggestion came from.
///
/// Declaration order is the tie-break priority: recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Recent,
    Popular,
    Smart,
    Category,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Recent => "recent",
            SuggestionKind::Popular => "popular",
            SuggestionKind::Smart => "smart",
            SuggestionKind::Category => "category",
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked autocomplete entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub kind: SuggestionKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u64>,
    pub relevance: f64,
}

impl Suggestion {
    pub(crate) fn new(kind: SuggestionKind, text: impl Into<String>, relevance: f64) -> Self {
        let text = text.into();
        Self {
            id: format!("{}:{}", kind, text.to_lowercase()),
            kind,
            text,
            category: None,
            result_count: None,
            relevance,
        }
    }
}

/// One completed search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub result_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterModel>,
}

/// How often a normalized query was searched or selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularityEntry {
    /// Most recent display form of the query.
    pub query: String,
    pub count: u32,
}

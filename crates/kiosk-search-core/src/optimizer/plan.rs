//! Query plan inspection and index suggestions.

use crate::config::OptimizerDefaults;
use crate::filter::{column_name, FilterModel};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ESTIMATED_ROWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~(\d+) rows").expect("static regex"));

/// How the engine reaches the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanType {
    Index,
    FullScan,
    FullText,
}

/// Coarse summary of an engine plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub estimated_rows: Option<u64>,
    pub uses_index: bool,
    pub scan_type: ScanType,
    pub cost: f64,
    /// Plan lines as reported by the engine.
    pub raw_details: Vec<String>,
}

impl QueryPlan {
    /// Classify plan detail lines.
    ///
    /// Full-text access wins over index access, which wins over a plain scan.
    pub fn from_details(details: Vec<String>) -> Self {
        let mut full_text = false;
        let mut indexed = false;
        let mut estimated_rows: Option<u64> = None;

        for line in &details {
            let upper = line.to_uppercase();
            if upper.contains("VIRTUAL TABLE") || upper.contains("_FTS") {
                full_text = true;
            } else if upper.contains("USING INDEX")
                || upper.contains("USING COVERING INDEX")
                || upper.contains("USING INTEGER PRIMARY KEY")
                || upper.contains("USING ROWID")
            {
                indexed = true;
            }

            if let Some(rows) = ESTIMATED_ROWS
                .captures(line)
                .and_then(|caps| caps[1].parse::<u64>().ok())
            {
                estimated_rows = Some(estimated_rows.map_or(rows, |n| n.max(rows)));
            }
        }

        let scan_type = if full_text {
            ScanType::FullText
        } else if indexed {
            ScanType::Index
        } else {
            ScanType::FullScan
        };

        Self {
            estimated_rows,
            uses_index: scan_type != ScanType::FullScan,
            scan_type,
            cost: cost_of(scan_type),
            raw_details: details,
        }
    }

    /// Plan assumed when the engine could not explain the query.
    pub fn conservative() -> Self {
        Self {
            estimated_rows: None,
            uses_index: false,
            scan_type: ScanType::FullScan,
            cost: OptimizerDefaults::FULL_SCAN_COST,
            raw_details: Vec::new(),
        }
    }
}

fn cost_of(scan_type: ScanType) -> f64 {
    match scan_type {
        ScanType::Index | ScanType::FullText => OptimizerDefaults::INDEXED_COST,
        ScanType::FullScan => OptimizerDefaults::FULL_SCAN_COST,
    }
}

/// `CREATE INDEX` statements for the columns a filter constrains.
///
/// One per distinct text, date or range column, plus a composite index over
/// the first text and first date column when both kinds are present.
pub fn suggest_indexes(model: &FilterModel) -> Vec<String> {
    let table = model.content_type.table_name();
    let mut columns: Vec<String> = Vec::new();

    let text_columns: Vec<String> = model
        .text_filters
        .iter()
        .filter_map(|f| column_name(&f.field))
        .collect();
    let date_columns: Vec<String> = model
        .date_filters
        .iter()
        .filter_map(|f| column_name(&f.field))
        .collect();
    let range_columns = model.range_filters.iter().filter_map(|f| column_name(&f.field));

    for column in text_columns
        .iter()
        .chain(date_columns.iter())
        .cloned()
        .chain(range_columns)
    {
        if !columns.contains(&column) {
            columns.push(column);
        }
    }

    let mut suggestions: Vec<String> = columns
        .iter()
        .map(|column| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column});",
                table = table,
                column = column
            )
        })
        .collect();

    if let (Some(text), Some(date)) = (text_columns.first(), date_columns.first()) {
        if text != date {
            suggestions.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{text}_{date} ON {table}({text}, {date});",
                table = table,
                text = text,
                date = date
            ));
        }
    }

    suggestions
}

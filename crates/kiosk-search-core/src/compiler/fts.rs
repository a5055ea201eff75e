//! FTS5 match-expression building.

use crate::filter::{LogicalOperator, MatchType};
use regex::Regex;
use std::sync::LazyLock;

/// Characters that force a term to be quoted in an FTS5 expression.
static FTS5_SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[-._":*()^+\s]"#).expect("static regex"));

/// Escape a term for FTS5 queries.
///
/// Terms containing special characters or whitespace are wrapped in quotes,
/// doubling any quotes already present.
pub fn escape_fts5_term(term: &str) -> String {
    if FTS5_SPECIAL_CHARS.is_match(term) {
        let escaped = term.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        term.to_string()
    }
}

/// Build a column-scoped term, wildcarded according to the match type.
///
/// - `startsWith` → `column:term*`
/// - `contains`   → `column:*term*`
/// - `endsWith`   → `column:*term`
///
/// Returns `None` for `equals` (compiled as a plain comparison) and for blank
/// search text.
pub fn build_match_term(column: &str, value: &str, match_type: MatchType) -> Option<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return None;
    }
    let term = escape_fts5_term(&value);

    match match_type {
        MatchType::Equals => None,
        MatchType::StartsWith => Some(format!("{}:{}*", column, term)),
        MatchType::Contains => Some(format!("{}:*{}*", column, term)),
        MatchType::EndsWith => Some(format!("{}:*{}", column, term)),
    }
}

/// Join terms into one match expression.
pub fn join_match_terms(terms: &[String], operator: LogicalOperator) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    Some(terms.join(&format!(" {} ", operator.as_sql())))
}

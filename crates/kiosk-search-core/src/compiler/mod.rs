//! Filter-to-SQL compilation.
//!
//! A [`FilterModel`] compiles to a single SELECT against its content type's
//! table, with every value bound through a positional `?` placeholder:
//!
//! - non-`equals` text filters become one FTS5 `MATCH` against `<table>_fts`,
//!   always the first bind value
//! - text `equals` → case-insensitive equality
//! - dates → `>=` / `<=` bounds (presets replace explicit bounds)
//! - ranges → `BETWEEN`
//! - booleans → equality against 0/1
//! - custom filters → column, operator and value as given
//!
//! [`FilterNode`] trees from the visual builder compile to a condition built
//! from the same pieces; see [`QueryCompiler::compile_tree`].

mod fts;
mod query;
mod tree;

pub use fts::{build_match_term, escape_fts5_term, join_match_terms};
pub use query::{CompiledQuery, ALWAYS_TRUE};

use query::{Clause, QueryParts};

use crate::config::CompilerDefaults;
use crate::error::{Result, SearchError};
use crate::filter::{column_name, FilterModel, FilterValue, MatchType};
use chrono::{Duration, NaiveDate, Utc};
use tracing::debug;

/// Compiles filter descriptions into parameterized SQL.
///
/// Compilation is pure: the input model is never modified and the only
/// ambient input is the reference date used for date presets.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    reference_date: Option<NaiveDate>,
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve date presets against a fixed date instead of today.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Compile a flat filter into a SELECT.
    pub fn compile(&self, model: &FilterModel) -> Result<CompiledQuery> {
        let compiled = self.parts(model)?.select();
        debug!(
            "Compiled {} filter: {} ({} params)",
            model.content_type,
            compiled.text,
            compiled.params.len()
        );
        Ok(compiled)
    }

    /// Compile a flat filter into a `SELECT COUNT(*)` over the same predicates.
    pub fn compile_count(&self, model: &FilterModel) -> Result<CompiledQuery> {
        Ok(self.parts(model)?.count())
    }

    /// Compile only the condition of a flat filter.
    pub fn compile_where(&self, model: &FilterModel) -> Result<CompiledQuery> {
        Ok(self.parts(model)?.where_body())
    }

    pub(crate) fn parts(&self, model: &FilterModel) -> Result<QueryParts> {
        let table = model.content_type.table_name();
        let column = |field: &str| -> Result<String> {
            column_name(field).ok_or_else(|| SearchError::InvalidField {
                field: field.to_string(),
            })
        };

        let mut terms = Vec::new();
        let mut clauses = Vec::new();

        for text in &model.text_filters {
            let col = column(&text.field)?;
            if text.match_type == MatchType::Equals {
                clauses.push(Clause {
                    sql: format!("LOWER({}.{}) = LOWER(?)", table, col),
                    params: vec![FilterValue::Text(text.value.clone())],
                });
            } else if let Some(term) = build_match_term(&col, &text.value, text.match_type) {
                terms.push(term);
            }
        }

        for date in &model.date_filters {
            let col = column(&date.field)?;
            let (start, end) = match date.preset.offset_days() {
                Some(days) => {
                    let today = self.today();
                    (Some(today - Duration::days(days)), Some(today))
                }
                None => (date.start, date.end),
            };
            let clause = match (start, end) {
                (Some(start), Some(end)) => Clause {
                    sql: format!("({t}.{c} >= ? AND {t}.{c} <= ?)", t = table, c = col),
                    params: vec![date_value(start), date_value(end)],
                },
                (Some(start), None) => Clause {
                    sql: format!("{}.{} >= ?", table, col),
                    params: vec![date_value(start)],
                },
                (None, Some(end)) => Clause {
                    sql: format!("{}.{} <= ?", table, col),
                    params: vec![date_value(end)],
                },
                (None, None) => continue,
            };
            clauses.push(clause);
        }

        for range in &model.range_filters {
            let col = column(&range.field)?;
            clauses.push(Clause {
                sql: format!("{}.{} BETWEEN ? AND ?", table, col),
                params: vec![FilterValue::from_f64(range.min), FilterValue::from_f64(range.max)],
            });
        }

        for flag in &model.boolean_filters {
            let col = column(&flag.field)?;
            clauses.push(Clause {
                sql: format!("{}.{} = ?", table, col),
                params: vec![FilterValue::Integer(i64::from(flag.value))],
            });
        }

        for custom in &model.custom_filters {
            let col = column(&custom.field)?;
            clauses.push(Clause {
                sql: format!("{}.{} {} ?", table, col, custom.operator.as_sql()),
                params: vec![custom.value.clone()],
            });
        }

        Ok(QueryParts {
            content_type: model.content_type,
            operator: model.operator,
            match_expression: join_match_terms(&terms, model.operator),
            clauses,
        })
    }
}

fn date_value(date: NaiveDate) -> FilterValue {
    FilterValue::Text(date.format(CompilerDefaults::DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ComparisonOperator, ContentType, DatePreset, LogicalOperator};

    fn compiler() -> QueryCompiler {
        QueryCompiler::new().with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
    }

    #[test]
    fn test_equals_and_range() {
        let model = FilterModel::new(ContentType::Alumni)
            .with_range("graduationYear", 2015.0, 2025.0)
            .with_text("city", "Boston", MatchType::Equals);

        let q = compiler().compile(&model).unwrap();
        assert_eq!(
            q.text,
            "SELECT alumni.* FROM alumni WHERE LOWER(alumni.city) = LOWER(?) AND alumni.graduation_year BETWEEN ? AND ?"
        );
        assert_eq!(
            q.params,
            vec![
                FilterValue::Text("Boston".into()),
                FilterValue::Integer(2015),
                FilterValue::Integer(2025)
            ]
        );
    }

    #[test]
    fn test_fts_terms_join_with_operator() {
        let model = FilterModel::new(ContentType::Publications)
            .with_operator(LogicalOperator::Or)
            .with_text("title", "Contract", MatchType::StartsWith)
            .with_text("author", "Smith", MatchType::EndsWith)
            .with_boolean("peerReviewed", true);

        let q = compiler().compile(&model).unwrap();
        assert_eq!(
            q.params[0],
            FilterValue::Text("title:contract* OR author:*smith".into())
        );
        assert_eq!(q.params[1], FilterValue::Integer(1));
        assert!(q.text.contains("publications_fts MATCH ?"));
        assert!(q.text.contains(" OR publications.peer_reviewed = ?"));
        assert_eq!(q.params.len(), q.placeholder_count());
    }

    #[test]
    fn test_date_preset_overrides_bounds() {
        let model = FilterModel::new(ContentType::Photos).with_date(
            "takenAt",
            NaiveDate::from_ymd_opt(1990, 1, 1),
            NaiveDate::from_ymd_opt(1991, 1, 1),
            DatePreset::LastWeek,
        );

        let q = compiler().compile_where(&model).unwrap();
        assert_eq!(q.text, "(photos.taken_at >= ? AND photos.taken_at <= ?)");
        assert_eq!(
            q.params,
            vec![
                FilterValue::Text("2024-06-08".into()),
                FilterValue::Text("2024-06-15".into())
            ]
        );
    }

    #[test]
    fn test_custom_date_single_bound() {
        let model = FilterModel::new(ContentType::Alumni).with_date(
            "gradDate",
            None,
            NaiveDate::from_ymd_opt(2000, 6, 1),
            DatePreset::Custom,
        );
        let q = compiler().compile_where(&model).unwrap();
        assert_eq!(q.text, "alumni.grad_date <= ?");
        assert_eq!(q.params, vec![FilterValue::Text("2000-06-01".into())]);
    }

    #[test]
    fn test_custom_filter_operator() {
        let model = FilterModel::new(ContentType::Faculty)
            .with_custom("hireYear", ComparisonOperator::Gte, 1999i64);
        let q = compiler().compile_where(&model).unwrap();
        assert_eq!(q.text, "faculty.hire_year >= ?");
        assert_eq!(q.params, vec![FilterValue::Integer(1999)]);
    }

    #[test]
    fn test_empty_model_selects_everything() {
        let q = compiler().compile(&FilterModel::new(ContentType::Alumni)).unwrap();
        assert_eq!(q.text, "SELECT alumni.* FROM alumni WHERE 1=1");
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_invalid_field_is_rejected() {
        let model = FilterModel::new(ContentType::Alumni)
            .with_text("city) OR (1", "x", MatchType::Equals);
        let err = compiler().compile(&model).unwrap_err();
        assert!(matches!(err, SearchError::InvalidField { .. }));
    }

    #[test]
    fn test_compile_does_not_mutate_model() {
        let model = FilterModel::new(ContentType::Alumni)
            .with_text("lastName", "Doe", MatchType::Contains)
            .with_date("gradDate", None, None, DatePreset::LastYear);
        let before = model.clone();
        compiler().compile(&model).unwrap();
        assert_eq!(model, before);
    }

    #[test]
    fn test_count_matches_select_params() {
        let model = FilterModel::new(ContentType::Alumni)
            .with_text("lastName", "Doe", MatchType::Contains)
            .with_range("graduationYear", 1990.0, 2000.0);
        let select = compiler().compile(&model).unwrap();
        let count = compiler().compile_count(&model).unwrap();
        assert_eq!(select.params, count.params);
        assert_eq!(count.params.len(), count.placeholder_count());
    }
}

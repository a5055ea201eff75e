//! Typed filter descriptions: the flat [`FilterModel`] and the
//! visual-builder [`FilterNode`] tree.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The searchable categories. Each maps to exactly one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    #[default]
    Alumni,
    Publications,
    Photos,
    Faculty,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Alumni,
        ContentType::Publications,
        ContentType::Photos,
        ContentType::Faculty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Alumni => "alumni",
            ContentType::Publications => "publications",
            ContentType::Photos => "photos",
            ContentType::Faculty => "faculty",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            ContentType::Alumni => "alumni",
            ContentType::Publications => "publications",
            ContentType::Photos => "photos",
            ContentType::Faculty => "faculty",
        }
    }

    /// Name of the full-text relation shadowing this type's table.
    pub fn fts_table_name(&self) -> String {
        format!("{}_fts", self.table_name())
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "alumni" => Some(ContentType::Alumni),
            "publications" => Some(ContentType::Publications),
            "photos" => Some(ContentType::Photos),
            "faculty" => Some(ContentType::Faculty),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How predicates are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Equals,
    #[default]
    Contains,
    StartsWith,
    EndsWith,
}

impl MatchType {
    pub const NAMES: [&'static str; 4] = ["equals", "contains", "startsWith", "endsWith"];
}

/// Relative date windows. Anything but `Custom` replaces explicit bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatePreset {
    Today,
    LastWeek,
    LastMonth,
    LastYear,
    Last5Years,
    Last10Years,
    #[default]
    Custom,
}

impl DatePreset {
    pub const NAMES: [&'static str; 7] = [
        "today",
        "lastWeek",
        "lastMonth",
        "lastYear",
        "last5Years",
        "last10Years",
        "custom",
    ];

    /// Days before the reference date at which the window opens.
    pub fn offset_days(&self) -> Option<i64> {
        match self {
            DatePreset::Today => Some(0),
            DatePreset::LastWeek => Some(7),
            DatePreset::LastMonth => Some(30),
            DatePreset::LastYear => Some(365),
            DatePreset::Last5Years => Some(1826),
            DatePreset::Last10Years => Some(3652),
            DatePreset::Custom => None,
        }
    }
}

/// Comparison used by a [`CustomFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
}

impl ComparisonOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::NotLike => "NOT LIKE",
        }
    }
}

/// A bind value. Closed so the compiler can match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FilterValue {
    /// Numbers without a fractional part bind as integers.
    pub fn from_f64(n: f64) -> Self {
        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            FilterValue::Integer(n as i64)
        } else {
            FilterValue::Number(n)
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Integer(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Boolean(b)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(d: NaiveDate) -> Self {
        FilterValue::Date(d)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFilter {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFilter {
    pub field: String,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub preset: DatePreset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeFilter {
    pub field: String,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub step: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanFilter {
    pub field: String,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFilter {
    pub field: String,
    pub operator: ComparisonOperator,
    pub value: FilterValue,
}

/// A flat search filter: every predicate list joined by one operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterModel {
    pub content_type: ContentType,
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub text_filters: Vec<TextFilter>,
    #[serde(default)]
    pub date_filters: Vec<DateFilter>,
    #[serde(default)]
    pub range_filters: Vec<RangeFilter>,
    #[serde(default)]
    pub boolean_filters: Vec<BooleanFilter>,
    #[serde(default)]
    pub custom_filters: Vec<CustomFilter>,
}

impl FilterModel {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            ..Default::default()
        }
    }

    pub fn with_operator(mut self, operator: LogicalOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_text(
        mut self,
        field: impl Into<String>,
        value: impl Into<String>,
        match_type: MatchType,
    ) -> Self {
        self.text_filters.push(TextFilter {
            field: field.into(),
            value: value.into(),
            match_type,
        });
        self
    }

    pub fn with_date(
        mut self,
        field: impl Into<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        preset: DatePreset,
    ) -> Self {
        self.date_filters.push(DateFilter {
            field: field.into(),
            start,
            end,
            preset,
        });
        self
    }

    pub fn with_range(mut self, field: impl Into<String>, min: f64, max: f64) -> Self {
        self.range_filters.push(RangeFilter {
            field: field.into(),
            min,
            max,
            step: None,
        });
        self
    }

    pub fn with_boolean(mut self, field: impl Into<String>, value: bool) -> Self {
        self.boolean_filters.push(BooleanFilter {
            field: field.into(),
            value,
        });
        self
    }

    pub fn with_custom(
        mut self,
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.custom_filters.push(CustomFilter {
            field: field.into(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn predicate_count(&self) -> usize {
        self.text_filters.len()
            + self.date_filters.len()
            + self.range_filters.len()
            + self.boolean_filters.len()
            + self.custom_filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicate_count() == 0
    }
}

/// A node of the visual filter builder's tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterNode {
    Filter {
        #[serde(default)]
        id: Option<String>,
        filter: FilterModel,
    },
    Operator {
        #[serde(default)]
        id: Option<String>,
        operator: LogicalOperator,
        #[serde(default)]
        children: Vec<FilterNode>,
    },
    /// Children of a group are always ANDed.
    Group {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    pub fn filter(filter: FilterModel) -> Self {
        FilterNode::Filter { id: None, filter }
    }

    pub fn operator(operator: LogicalOperator, children: Vec<FilterNode>) -> Self {
        FilterNode::Operator {
            id: None,
            operator,
            children,
        }
    }

    pub fn group(children: Vec<FilterNode>) -> Self {
        FilterNode::Group { id: None, children }
    }
}

/// Map a camelCase field name to its snake_case column.
///
/// Returns `None` for anything that is not a plain identifier.
pub fn column_name(field: &str) -> Option<String> {
    let mut chars = field.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    let mut column = String::with_capacity(field.len() + 4);
    let mut prev: Option<char> = None;
    for c in field.chars() {
        if c.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                column.push('_');
            }
            column.push(c.to_ascii_lowercase());
        } else {
            column.push(c);
        }
        prev = Some(c);
    }
    Some(column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_name() {
        assert_eq!(column_name("graduationYear").as_deref(), Some("graduation_year"));
        assert_eq!(column_name("city").as_deref(), Some("city"));
        assert_eq!(column_name("photoURL").as_deref(), Some("photo_url"));
        assert_eq!(column_name("last_name").as_deref(), Some("last_name"));
        assert_eq!(column_name("name; DROP TABLE"), None);
        assert_eq!(column_name("1st"), None);
        assert_eq!(column_name(""), None);
    }

    #[test]
    fn test_filter_model_from_json() {
        let model: FilterModel = serde_json::from_value(serde_json::json!({
            "contentType": "alumni",
            "operator": "OR",
            "textFilters": [{"field": "lastName", "value": "Doe", "matchType": "startsWith"}],
            "rangeFilters": [{"field": "graduationYear", "min": 2000, "max": 2010}],
            "customFilters": [{"field": "classRole", "operator": "!=", "value": "faculty"}]
        }))
        .unwrap();

        assert_eq!(model.operator, LogicalOperator::Or);
        assert_eq!(model.text_filters[0].match_type, MatchType::StartsWith);
        assert_eq!(model.custom_filters[0].operator, ComparisonOperator::Ne);
        assert_eq!(model.predicate_count(), 3);
    }

    #[test]
    fn test_filter_value_untagged() {
        let values: Vec<FilterValue> =
            serde_json::from_str(r#"[true, 3, 2.5, "2020-05-01", "Boston"]"#).unwrap();
        assert_eq!(values[0], FilterValue::Boolean(true));
        assert_eq!(values[1], FilterValue::Integer(3));
        assert_eq!(values[2], FilterValue::Number(2.5));
        assert_eq!(
            values[3],
            FilterValue::Date(NaiveDate::from_ymd_opt(2020, 5, 1).unwrap())
        );
        assert_eq!(values[4], FilterValue::Text("Boston".into()));
    }

    #[test]
    fn test_filter_node_tagging() {
        let node: FilterNode = serde_json::from_value(serde_json::json!({
            "type": "operator",
            "operator": "OR",
            "children": [
                {"type": "filter", "filter": {"contentType": "alumni"}},
                {"type": "group", "children": []}
            ]
        }))
        .unwrap();

        match node {
            FilterNode::Operator { operator, children, .. } => {
                assert_eq!(operator, LogicalOperator::Or);
                assert_eq!(children.len(), 2);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_preset_offsets() {
        assert_eq!(DatePreset::Today.offset_days(), Some(0));
        assert_eq!(DatePreset::LastYear.offset_days(), Some(365));
        assert_eq!(DatePreset::Custom.offset_days(), None);
    }
}

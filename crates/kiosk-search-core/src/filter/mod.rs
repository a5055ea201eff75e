//! Filter descriptions and their validation.

mod model;
mod validator;

pub use model::{
    column_name, BooleanFilter, ComparisonOperator, ContentType, CustomFilter, DateFilter,
    DatePreset, FilterModel, FilterNode, FilterValue, LogicalOperator, MatchType, RangeFilter,
    TextFilter,
};
pub use validator::{complexity, validate, validate_value, ValidationIssue, ValidationResult};

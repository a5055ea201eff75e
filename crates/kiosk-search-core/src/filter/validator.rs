//! Structural and semantic checks over filter descriptions.
//!
//! Problems are collected, never thrown, so a caller can render every
//! field-level message at once.

use super::model::{column_name, ContentType, DatePreset, FilterModel, LogicalOperator, MatchType};
use crate::config::{CompilerDefaults, ValidatorDefaults};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One field-level finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path of the offending field, e.g. `rangeFilters[1].min`.
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub complexity: f64,
}

impl ValidationResult {
    fn finish(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>, complexity: f64) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            complexity,
        }
    }
}

/// Weighted predicate count, scaled up for OR filters.
pub fn complexity(model: &FilterModel) -> f64 {
    let score = model.text_filters.len() as f64 * ValidatorDefaults::TEXT_WEIGHT
        + model.date_filters.len() as f64 * ValidatorDefaults::DATE_WEIGHT
        + model.range_filters.len() as f64 * ValidatorDefaults::RANGE_WEIGHT
        + model.boolean_filters.len() as f64 * ValidatorDefaults::BOOLEAN_WEIGHT
        + model.custom_filters.len() as f64 * ValidatorDefaults::CUSTOM_WEIGHT;

    match model.operator {
        LogicalOperator::Or => score * ValidatorDefaults::OR_MULTIPLIER,
        LogicalOperator::And => score,
    }
}

fn check_field(path: &str, field: &str, errors: &mut Vec<ValidationIssue>) {
    if field.trim().is_empty() {
        errors.push(ValidationIssue::new(path, "Field is required"));
    } else if column_name(field).is_none() {
        errors.push(ValidationIssue::new(
            path,
            format!("Field {:?} is not a valid identifier", field),
        ));
    }
}

/// Validate a typed filter model.
pub fn validate(model: &FilterModel) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (i, text) in model.text_filters.iter().enumerate() {
        check_field(&format!("textFilters[{}].field", i), &text.field, &mut errors);
        if text.value.trim().is_empty() {
            errors.push(ValidationIssue::new(
                format!("textFilters[{}].value", i),
                "Search text is required",
            ));
        }
    }

    for (i, date) in model.date_filters.iter().enumerate() {
        check_field(&format!("dateFilters[{}].field", i), &date.field, &mut errors);
        if let (Some(start), Some(end)) = (date.start, date.end) {
            if start > end {
                errors.push(ValidationIssue::new(
                    format!("dateFilters[{}].start", i),
                    format!("Start date {} is after end date {}", start, end),
                ));
            }
        }
        if date.preset == DatePreset::Custom && date.start.is_none() && date.end.is_none() {
            warnings.push(ValidationIssue::new(
                format!("dateFilters[{}]", i),
                "Custom date range has no bounds and matches every date",
            ));
        }
        if date.preset != DatePreset::Custom && (date.start.is_some() || date.end.is_some()) {
            warnings.push(ValidationIssue::new(
                format!("dateFilters[{}].preset", i),
                "Preset overrides the explicit start/end dates",
            ));
        }
    }

    for (i, range) in model.range_filters.iter().enumerate() {
        check_field(&format!("rangeFilters[{}].field", i), &range.field, &mut errors);
        if !range.min.is_finite() || !range.max.is_finite() {
            errors.push(ValidationIssue::new(
                format!("rangeFilters[{}]", i),
                "Range bounds must be finite numbers",
            ));
        } else if range.min > range.max {
            errors.push(ValidationIssue::new(
                format!("rangeFilters[{}].min", i),
                format!("Minimum {} is greater than maximum {}", range.min, range.max),
            ));
        }
        if let Some(step) = range.step {
            if !(step > 0.0) {
                errors.push(ValidationIssue::new(
                    format!("rangeFilters[{}].step", i),
                    "Step must be positive",
                ));
            }
        }
    }

    for (i, flag) in model.boolean_filters.iter().enumerate() {
        check_field(&format!("booleanFilters[{}].field", i), &flag.field, &mut errors);
    }

    for (i, custom) in model.custom_filters.iter().enumerate() {
        check_field(&format!("customFilters[{}].field", i), &custom.field, &mut errors);
    }

    if model.is_empty() {
        warnings.push(ValidationIssue::new(
            "filters",
            "No filters applied; every record will match",
        ));
    }

    let complexity = complexity(model);
    if complexity > ValidatorDefaults::COMPLEXITY_WARNING {
        warnings.push(ValidationIssue::new(
            "filters",
            format!(
                "Filter complexity {:.1} exceeds {}; the search may be slow",
                complexity,
                ValidatorDefaults::COMPLEXITY_WARNING
            ),
        ));
    }

    ValidationResult::finish(errors, warnings, complexity)
}

/// Validate an untyped JSON filter payload.
///
/// Structural problems (unknown content type or match type, non-boolean flag
/// values, missing fields) are reported per field. A structurally sound payload
/// is then deserialized and checked with [`validate`].
pub fn validate_value(payload: &Value) -> ValidationResult {
    let mut errors = Vec::new();

    let Some(obj) = payload.as_object() else {
        errors.push(ValidationIssue::new("filter", "Filter must be a JSON object"));
        return ValidationResult::finish(errors, Vec::new(), 0.0);
    };

    match obj.get("contentType") {
        None => errors.push(ValidationIssue::new("contentType", "Content type is required")),
        Some(Value::String(s)) if ContentType::from_str(s).is_some() => {}
        Some(other) => errors.push(ValidationIssue::new(
            "contentType",
            format!(
                "Unknown content type {}; expected one of {}",
                other,
                ContentType::ALL.map(|c| c.as_str()).join(", ")
            ),
        )),
    }

    match obj.get("operator") {
        None => {}
        Some(Value::String(s)) if s == "AND" || s == "OR" => {}
        Some(other) => errors.push(ValidationIssue::new(
            "operator",
            format!("Operator must be AND or OR, got {}", other),
        )),
    }

    check_list(obj, "textFilters", &mut errors, |path, item, errors| {
        require_string(path, item, "field", errors);
        require_string(path, item, "value", errors);
        if let Some(m) = item.get("matchType") {
            if !m.as_str().is_some_and(|m| MatchType::NAMES.contains(&m)) {
                errors.push(ValidationIssue::new(
                    format!("{}.matchType", path),
                    format!("Unknown match type {}", m),
                ));
            }
        }
    });

    check_list(obj, "dateFilters", &mut errors, |path, item, errors| {
        require_string(path, item, "field", errors);
        if let Some(p) = item.get("preset") {
            if !p.as_str().is_some_and(|p| DatePreset::NAMES.contains(&p)) {
                errors.push(ValidationIssue::new(
                    format!("{}.preset", path),
                    format!("Unknown date preset {}", p),
                ));
            }
        }
        for bound in ["start", "end"] {
            match item.get(bound) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if NaiveDate::parse_from_str(s, CompilerDefaults::DATE_FORMAT).is_ok() => {}
                Some(other) => errors.push(ValidationIssue::new(
                    format!("{}.{}", path, bound),
                    format!("Expected a YYYY-MM-DD date, got {}", other),
                )),
            }
        }
    });

    check_list(obj, "rangeFilters", &mut errors, |path, item, errors| {
        require_string(path, item, "field", errors);
        for bound in ["min", "max"] {
            if !item.get(bound).is_some_and(Value::is_number) {
                errors.push(ValidationIssue::new(
                    format!("{}.{}", path, bound),
                    "Expected a number",
                ));
            }
        }
        if let Some(step) = item.get("step") {
            if !step.is_null() && !step.is_number() {
                errors.push(ValidationIssue::new(format!("{}.step", path), "Expected a number"));
            }
        }
    });

    check_list(obj, "booleanFilters", &mut errors, |path, item, errors| {
        require_string(path, item, "field", errors);
        if !item.get("value").is_some_and(Value::is_boolean) {
            errors.push(ValidationIssue::new(
                format!("{}.value", path),
                "Expected true or false",
            ));
        }
    });

    check_list(obj, "customFilters", &mut errors, |path, item, errors| {
        require_string(path, item, "field", errors);
        const OPERATORS: [&str; 8] = ["=", "!=", "<", "<=", ">", ">=", "LIKE", "NOT LIKE"];
        if !item
            .get("operator")
            .and_then(Value::as_str)
            .is_some_and(|op| OPERATORS.contains(&op))
        {
            errors.push(ValidationIssue::new(
                format!("{}.operator", path),
                format!("Operator must be one of {}", OPERATORS.join(", ")),
            ));
        }
        if !item
            .get("value")
            .is_some_and(|v| !v.is_null() && !v.is_array() && !v.is_object())
        {
            errors.push(ValidationIssue::new(
                format!("{}.value", path),
                "Expected a string, number, boolean or date",
            ));
        }
    });

    if !errors.is_empty() {
        return ValidationResult::finish(errors, Vec::new(), 0.0);
    }

    match serde_json::from_value::<FilterModel>(payload.clone()) {
        Ok(model) => validate(&model),
        Err(e) => {
            errors.push(ValidationIssue::new("filter", e.to_string()));
            ValidationResult::finish(errors, Vec::new(), 0.0)
        }
    }
}

fn check_list(
    obj: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<ValidationIssue>,
    check_item: impl Fn(&str, &Map<String, Value>, &mut Vec<ValidationIssue>),
) {
    match obj.get(key) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let path = format!("{}[{}]", key, i);
                match item.as_object() {
                    Some(item) => check_item(&path, item, errors),
                    None => errors.push(ValidationIssue::new(path, "Expected an object")),
                }
            }
        }
        Some(_) => errors.push(ValidationIssue::new(key, "Expected a list")),
    }
}

fn require_string(path: &str, item: &Map<String, Value>, key: &str, errors: &mut Vec<ValidationIssue>) {
    if !item.get(key).is_some_and(Value::is_string) {
        errors.push(ValidationIssue::new(
            format!("{}.{}", path, key),
            "Expected a string",
        ));
    }
}

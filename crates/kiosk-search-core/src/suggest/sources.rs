//! Candidate sources that do not depend on usage history.

use super::types::{Suggestion, SuggestionKind};
use crate::config::RankerDefaults;
use crate::filter::ContentType;
use regex::Regex;
use std::sync::LazyLock;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}\b").expect("static regex"));

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+").expect("static regex"));

static LEGAL_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(law|legal|court|case|constitution\w*|contract\w*|tort\w*|statute\w*|justice|rights|litigation|appeal\w*)\b",
    )
    .expect("static regex")
});

/// Fixed vocabulary offered per content type.
pub fn category_terms(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::Alumni => &[
            "alumni association",
            "class reunion",
            "distinguished alumni",
            "graduates by year",
            "notable alumni",
        ],
        ContentType::Publications => &[
            "case studies",
            "faculty publications",
            "journal articles",
            "law review",
            "legal briefs",
        ],
        ContentType::Photos => &[
            "campus events",
            "class photos",
            "commencement",
            "historic photos",
        ],
        ContentType::Faculty => &[
            "adjunct faculty",
            "emeritus faculty",
            "faculty publications",
            "professors",
        ],
    }
}

/// Base relevance at `rank` for a source starting at `base`.
pub(crate) fn decayed(base: f64, rank: usize) -> f64 {
    (base - RankerDefaults::RANK_DECAY * rank as f64).max(0.0)
}

/// Vocabulary entries for `content_type` containing `needle`.
pub(crate) fn category_suggestions(content_type: ContentType, needle: &str) -> Vec<Suggestion> {
    category_terms(content_type)
        .iter()
        .filter(|term| term.contains(needle))
        .enumerate()
        .map(|(rank, term)| {
            let mut suggestion = Suggestion::new(
                SuggestionKind::Category,
                *term,
                decayed(RankerDefaults::CATEGORY_BASE, rank),
            );
            suggestion.category = Some(content_type.as_str().to_string());
            suggestion
        })
        .collect()
}

/// Template suggestions triggered by the shape of the input.
pub(crate) fn smart_suggestions(input: &str) -> Vec<Suggestion> {
    let mut out = Vec::new();
    if YEAR.is_match(input) {
        out.push(format!("{} graduates", input));
    }
    if CAPITALIZED_WORD.is_match(input) {
        out.push(format!("{} (name search)", input));
    }
    if LEGAL_TERM.is_match(input) {
        out.push(format!("{} publications", input));
    }

    out.into_iter()
        .map(|text| Suggestion::new(SuggestionKind::Smart, text, RankerDefaults::SMART_BASE))
        .collect()
}

/// Scale a base relevance by how well `candidate` matches `needle`.
///
/// Both arguments are expected lowercase.
pub(crate) fn adjust_relevance(base: f64, candidate: &str, needle: &str) -> f64 {
    if candidate == needle {
        base * RankerDefaults::EXACT_BOOST
    } else if candidate.starts_with(needle) {
        base * RankerDefaults::PREFIX_BOOST
    } else if candidate.contains(needle) {
        base * RankerDefaults::SUBSTRING_BOOST
    } else {
        0.5 * base + 0.5 * similarity(candidate, needle)
    }
}

/// `1 - distance / longer length`, in characters.
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    let longer = a.chars().count().max(b.chars().count());
    if longer == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / longer as f64
}

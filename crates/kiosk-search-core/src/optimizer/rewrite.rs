//! Pure text rewrites applied before statements are registered.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `1=1` joined by AND on either side. Always a removable conjunct.
static AND_TRUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+1=1\b|\b1=1\s+AND\s+").expect("static regex"));

/// `OR 0=1`, with an optional trailing AND that makes it part of a conjunction.
static OR_FALSE_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+OR\s+0=1\b(\s+AND\b)?").expect("static regex"));

/// `0=1 OR`, with an optional leading AND that makes it part of a conjunction.
static OR_FALSE_BEFORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\bAND\s+)?\b0=1\s+OR\s+").expect("static regex"));

/// Rewrite query text into its canonical form.
///
/// Removes `AND 1=1` / `OR 0=1` connectors, collapses doubled parentheses and
/// normalizes whitespace, repeating until nothing changes. The result is a
/// fixed point, so `optimize(optimize(q)) == optimize(q)`.
pub fn optimize(text: &str) -> String {
    let mut current = normalize_whitespace(text);
    loop {
        let next = normalize_whitespace(&collapse_parens(&strip_connectors(&current)));
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_connectors(text: &str) -> String {
    let text = AND_TRUE.replace_all(text, "");
    // `x AND 0=1 OR y` is `(x AND 0=1) OR y`; only a whole disjunct can go.
    let text = OR_FALSE_AFTER.replace_all(&text, |caps: &Captures| {
        if caps.get(1).is_some() {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    let text = OR_FALSE_BEFORE.replace_all(&text, |caps: &Captures| {
        if caps.get(1).is_some() {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    text.into_owned()
}

/// Byte ranges of quoted literals are skipped by the scanners below.
fn matching_parens(text: &str) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;

    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '(' => stack.push(i),
            None if c == ')' => {
                if let Some(open) = stack.pop() {
                    pairs.push((open, i));
                }
            }
            None => {}
        }
    }
    pairs
}

/// Drop the outer pair of every `((…))` whose inner pair spans it exactly.
fn collapse_parens(text: &str) -> String {
    let pairs = matching_parens(text);
    let close_of: std::collections::HashMap<usize, usize> = pairs.iter().copied().collect();
    let bytes = text.as_bytes();

    let mut removed = vec![false; bytes.len()];
    for &(open, close) in &pairs {
        let inner_open = skip_spaces_forward(bytes, open + 1);
        let inner_close = skip_spaces_backward(bytes, close);
        let (Some(inner_open), Some(inner_close)) = (inner_open, inner_close) else {
            continue;
        };
        if bytes[inner_open] == b'(' && close_of.get(&inner_open) == Some(&inner_close) {
            removed[open] = true;
            removed[close] = true;
        }
    }

    text.char_indices()
        .filter(|(i, _)| !removed[*i])
        .map(|(_, c)| c)
        .collect()
}

fn skip_spaces_forward(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&i| !bytes[i].is_ascii_whitespace())
}

/// Last non-space index strictly before `before`.
fn skip_spaces_backward(bytes: &[u8], before: usize) -> Option<usize> {
    (0..before).rev().find(|&i| !bytes[i].is_ascii_whitespace())
}

/// Collapse whitespace runs outside literals and tighten it around parentheses.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in text.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with('(') && c != ')' {
            out.push(' ');
        }
        pending_space = false;
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_true_conjuncts() {
        assert_eq!(
            optimize("SELECT * FROM alumni WHERE city = ? AND 1=1"),
            "SELECT * FROM alumni WHERE city = ?"
        );
        assert_eq!(
            optimize("SELECT * FROM alumni WHERE 1=1 AND city = ?"),
            "SELECT * FROM alumni WHERE city = ?"
        );
        assert_eq!(optimize("SELECT * FROM alumni WHERE 1=1"), "SELECT * FROM alumni WHERE 1=1");
    }

    #[test]
    fn test_strips_false_disjuncts() {
        assert_eq!(optimize("WHERE a = ? OR 0=1"), "WHERE a = ?");
        assert_eq!(optimize("WHERE 0=1 OR a = ?"), "WHERE a = ?");
        assert_eq!(optimize("WHERE a = ? OR 0=1 OR b = ?"), "WHERE a = ? OR b = ?");
    }

    #[test]
    fn test_keeps_false_inside_conjunction() {
        assert_eq!(optimize("WHERE x = ? AND 0=1 OR y = ?"), "WHERE x = ? AND 0=1 OR y = ?");
        assert_eq!(optimize("WHERE x = ? OR 0=1 AND y = ?"), "WHERE x = ? OR 0=1 AND y = ?");
    }

    #[test]
    fn test_collapses_nested_parens() {
        assert_eq!(optimize("WHERE (((a = ?)))"), "WHERE (a = ?)");
        assert_eq!(optimize("WHERE (( a = ? ) OR ( b = ? ))"), "WHERE ((a = ?) OR (b = ?))");
        assert_eq!(optimize("WHERE ((a = ?) AND (b = ?))"), "WHERE ((a = ?) AND (b = ?))");
    }

    #[test]
    fn test_connector_removal_exposes_parens() {
        assert_eq!(optimize("WHERE ((a = ?) AND 1=1)"), "WHERE (a = ?)");
    }

    #[test]
    fn test_whitespace_normalized() {
        assert_eq!(
            optimize("  SELECT *\n  FROM alumni\tWHERE  ( a = ? )  "),
            "SELECT * FROM alumni WHERE (a = ?)"
        );
    }

    #[test]
    fn test_literals_untouched() {
        assert_eq!(optimize("WHERE a = '  x  (( y ))'"), "WHERE a = '  x  (( y ))'");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "SELECT * FROM alumni WHERE ((a = ?) AND 1=1) OR 0=1",
            "SELECT alumni.* FROM alumni WHERE 1=1 AND ((( b BETWEEN ? AND ? )))",
            "WHERE (x = ? AND 0=1 OR y = ?)",
            "SELECT COUNT(*) AS count FROM t WHERE t.rowid IN (SELECT rowid FROM t_fts WHERE t_fts MATCH ?)",
        ];
        for input in inputs {
            let once = optimize(input);
            assert_eq!(optimize(&once), once, "not idempotent for {input}");
        }
    }
}

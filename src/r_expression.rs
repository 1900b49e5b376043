//! Rendering of native values and names into R source text.
//!
//! Everything the bridge sends to the engine is plain R source. These
//! helpers are the single place where native values become R literals and
//! where zero-based indices become the engine's 1-based subscripts. Builders
//! and result accessors must never format R syntax by hand.

use crate::error::RanovaError;
use itertools::Itertools;
use regex::Regex;
use std::sync::OnceLock;

/// R reserved words that can never be used as bare identifiers.
const RESERVED_WORDS: &[&str] = &[
    "if", "else", "repeat", "while", "function", "for", "in", "next", "break", "TRUE", "FALSE",
    "NULL", "Inf", "NaN", "NA", "NA_integer_", "NA_real_", "NA_character_",
];

fn bare_identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\.[A-Za-z._]|[A-Za-z])[A-Za-z0-9._]*$").expect("static pattern")
    })
}

/// True if `name` is usable as a bare R token without quoting.
pub fn is_bare_identifier(name: &str) -> bool {
    bare_identifier_pattern().is_match(name) && !RESERVED_WORDS.contains(&name)
}

/// An escaped, double-quoted R string literal.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

pub fn bool_literal(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Render a finite double. R has no distinct float literal syntax, so the
/// shortest round-trippable decimal form is used.
pub fn numeric_literal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{value}")
    }
}

/// `c(a, b, ...)` over pre-encoded element literals. Empty input renders the
/// canonical empty vector `c()`.
pub fn vector_literal(elements: &[String]) -> String {
    format!("c({})", elements.iter().join(", "))
}

/// Row-major matrix construction call. The engine's generic constructor is
/// flat-vector driven, so the rows are flattened with `byrow = TRUE` and
/// explicit dimensions.
pub fn matrix_literal(rows: &[Vec<f64>]) -> Result<String, RanovaError> {
    let Some(first) = rows.first() else {
        return Err(RanovaError::Syntax(
            "A contrast matrix needs at least one row".to_string(),
        ));
    };
    let ncol = first.len();
    for (i, row) in rows.iter().enumerate() {
        if row.len() != ncol {
            return Err(RanovaError::ShapeMismatch {
                context: format!("matrix row {i}"),
                expected: ncol,
                actual: row.len(),
            });
        }
    }
    let elements = rows
        .iter()
        .flatten()
        .map(|v| numeric_literal(*v))
        .collect::<Vec<_>>();
    Ok(format!(
        "matrix({}, nrow = {}, ncol = {}, byrow = TRUE)",
        vector_literal(&elements),
        rows.len(),
        ncol
    ))
}

/// Why `readable` cannot be turned into a legal identifier, if it cannot.
/// Interactive validation paths check this before calling [`to_identifier`]
/// so that user typing never raises.
pub fn identifier_problem(readable: &str) -> Option<String> {
    let trimmed = readable.trim();
    if trimmed.is_empty() {
        return Some("The name is empty".to_string());
    }
    let first = trimmed.chars().next()?;
    if first.is_ascii_digit() {
        return Some(format!("'{trimmed}' starts with a digit"));
    }
    if first == '.' {
        if let Some(second) = trimmed.chars().nth(1) {
            if second.is_ascii_digit() {
                return Some(format!("'{trimmed}' starts with a dot followed by a digit"));
            }
        }
    }
    if RESERVED_WORDS.contains(&trimmed) {
        return Some(format!("'{trimmed}' is a reserved word"));
    }
    None
}

/// Map a human-readable name to a legal R identifier. Characters R does not
/// allow in names are replaced with dots.
pub fn to_identifier(readable: &str) -> Result<String, RanovaError> {
    if let Some(problem) = identifier_problem(readable) {
        return Err(RanovaError::Syntax(problem));
    }
    let mapped: String = readable
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' {
                ch
            } else {
                '.'
            }
        })
        .collect();
    Ok(mapped)
}

/// Return `name` unchanged if it is a legal bare token, otherwise wrap it in
/// backticks so the engine treats it as a quoted name.
pub fn quote_if_reserved(name: &str) -> String {
    if is_bare_identifier(name) {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}

/// `base[[index + 1]]`: element access with the zero-to-one-based
/// translation applied. Engine-side collections are 1-indexed; this boundary
/// is the only place the translation happens.
pub fn element_index(base: &str, index: usize) -> String {
    format!("{base}[[{}]]", index + 1)
}

/// `base[, index + 1]`: single-column access on a matrix-shaped value.
pub fn column_index(base: &str, index: usize) -> String {
    format!("{base}[, {}]", index + 1)
}

/// `base[row + 1, col + 1]`: scalar cell access.
pub fn matrix_index(base: &str, row: usize, col: usize) -> String {
    format!("{base}[{}, {}]", row + 1, col + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_literal_escapes_quotes_and_backslashes() {
        assert_eq!(string_literal("plain"), "\"plain\"");
        assert_eq!(string_literal("a \"b\" c"), "\"a \\\"b\\\" c\"");
        assert_eq!(string_literal("back\\slash"), "\"back\\\\slash\"");
        assert_eq!(string_literal("line\nbreak"), "\"line\\nbreak\"");
    }

    #[test]
    fn bool_literal_uses_engine_keywords() {
        assert_eq!(bool_literal(true), "TRUE");
        assert_eq!(bool_literal(false), "FALSE");
    }

    #[test]
    fn vector_literal_of_empty_input_is_empty_vector() {
        assert_eq!(vector_literal(&[]), "c()");
        assert_eq!(
            vector_literal(&["1".to_string(), "2".to_string()]),
            "c(1, 2)"
        );
    }

    #[test]
    fn matrix_literal_flattens_row_major() {
        let m = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, -1.0]];
        assert_eq!(
            matrix_literal(&m).unwrap(),
            "matrix(c(1, 0, 0, 1, 1, -1), nrow = 3, ncol = 2, byrow = TRUE)"
        );
    }

    #[test]
    fn matrix_literal_rejects_ragged_rows() {
        let m = vec![vec![1.0, 2.0], vec![3.0]];
        match matrix_literal(&m) {
            Err(RanovaError::ShapeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn identifier_mapping_replaces_illegal_characters() {
        assert_eq!(to_identifier("my fit").unwrap(), "my.fit");
        assert_eq!(to_identifier("fit-2b").unwrap(), "fit.2b");
        assert_eq!(to_identifier("aov1").unwrap(), "aov1");
    }

    #[test]
    fn identifier_problem_catches_bad_starts() {
        assert!(identifier_problem("").is_some());
        assert!(identifier_problem("   ").is_some());
        assert!(identifier_problem("2fast").is_some());
        assert!(identifier_problem(".2fast").is_some());
        assert!(identifier_problem(".hidden").is_none());
        assert!(identifier_problem("fine").is_none());
        assert!(to_identifier("9lives").is_err());
    }

    #[test]
    fn reserved_words_cannot_become_identifiers() {
        assert!(identifier_problem("TRUE").is_some());
        assert!(identifier_problem("if").is_some());
        assert!(identifier_problem("NA").is_some());
        assert!(to_identifier("FALSE").is_err());
        // Reserved words remain legal inside a longer name.
        assert!(identifier_problem("TRUE.positives").is_none());
    }

    #[test]
    fn quoting_applies_to_reserved_and_non_bare_names() {
        assert_eq!(quote_if_reserved("fit1"), "fit1");
        assert_eq!(quote_if_reserved("my.fit"), "my.fit");
        assert_eq!(quote_if_reserved("if"), "`if`");
        assert_eq!(quote_if_reserved("two words"), "`two words`");
        assert_eq!(quote_if_reserved("TRUE"), "`TRUE`");
    }

    #[test]
    fn index_helpers_translate_to_one_based() {
        assert_eq!(element_index("x", 0), "x[[1]]");
        assert_eq!(element_index("x", 4), "x[[5]]");
        assert_eq!(column_index("m", 0), "m[, 1]");
        assert_eq!(column_index("m", 4), "m[, 5]");
        assert_eq!(matrix_index("m", 2, 3), "m[3, 4]");
    }

    #[test]
    fn numeric_literal_keeps_specials_as_engine_tokens() {
        assert_eq!(numeric_literal(2.5), "2.5");
        assert_eq!(numeric_literal(f64::NAN), "NaN");
        assert_eq!(numeric_literal(f64::INFINITY), "Inf");
        assert_eq!(numeric_literal(f64::NEG_INFINITY), "-Inf");
    }
}

// Predicate Text Helpers
//
// Conditions are opaque SQL fragments. These helpers recover conjuncts and
// column references lexically; they do not parse expressions, so unusual
// condition text can be over- or under-matched.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static WHERE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^WHERE\s+").expect("valid WHERE marker pattern"));

static AND_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bAND\b").expect("valid AND keyword pattern"));

static NUMERIC_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid numeric literal pattern"));

/// Characters that separate tokens when scanning for column references
const TOKEN_SEPARATORS: &[char] = &['=', '<', '>', '!', '(', ')', ','];

/// Remove a leading `WHERE` keyword and surrounding whitespace
pub fn strip_where_marker(condition: &str) -> &str {
    let trimmed = condition.trim();
    match WHERE_MARKER.find(trimmed) {
        Some(m) => trimmed[m.end()..].trim(),
        None => trimmed,
    }
}

/// Split a condition on `AND` keywords that sit outside parentheses and
/// string literals. A condition without such a keyword yields one part.
pub fn split_conjuncts(condition: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;

    for m in AND_KEYWORD.find_iter(condition) {
        if !is_top_level(&condition[..m.start()]) {
            continue;
        }
        parts.push(condition[start..m.start()].trim());
        start = m.end();
    }
    parts.push(condition[start..].trim());

    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the end of `prefix` is outside any parenthesis or quoted string
fn is_top_level(prefix: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for ch in prefix.chars() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            _ => {}
        }
    }
    depth == 0 && !in_quote
}

/// Tokens that look like qualified column references, in order of appearance
fn qualified_tokens(condition: &str) -> impl Iterator<Item = &str> {
    condition
        .split(|c: char| c.is_whitespace() || TOKEN_SEPARATORS.contains(&c))
        .filter(|token| token.contains('.') && !NUMERIC_LITERAL.is_match(token))
}

/// Qualified column references (`alias.column`) used by a condition
pub fn extract_columns(condition: &str) -> BTreeSet<String> {
    qualified_tokens(condition).map(str::to_string).collect()
}

/// Alias prefixes of the qualified column references, in order of appearance
/// and with repeats kept
pub fn referenced_aliases(condition: &str) -> Vec<String> {
    qualified_tokens(condition)
        .filter_map(|token| token.split('.').next())
        .map(str::to_string)
        .collect()
}

/// True when every column is prefixed by one of the given aliases.
///
/// A condition without column references resolves trivially.
pub fn resolves_within(columns: &BTreeSet<String>, aliases: &BTreeSet<String>) -> bool {
    columns.iter().all(|column| {
        aliases
            .iter()
            .any(|alias| column.strip_prefix(alias.as_str()).is_some_and(|rest| rest.starts_with('.')))
    })
}

use std::collections::BTreeSet;

use serde::Serialize;

/// The free-text `sports` column holds either a plain name or a
/// list literal such as `['Tennis', 'Volley']`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SportsField {
    Scalar(String),
    List(Vec<String>),
}

impl SportsField {
    /// Never fails: anything that does not parse as a list stays a scalar.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            if let Some(items) = parse_list_literal(&trimmed[1..trimmed.len() - 1]) {
                return SportsField::List(items);
            }
        }
        SportsField::Scalar(raw.to_string())
    }

    /// Trimmed, non-empty sport names.
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            SportsField::Scalar(s) => vec![s.as_str()],
            SportsField::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Comma-separated quoted strings, single or double quotes, backslash escapes.
fn parse_list_literal(inner: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => item.push(chars.next()?),
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }

    Some(items)
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SportsIndex {
    pub sports: Vec<String>,
    pub total_count: usize,
}

/// Case-sensitive distinct names, sorted.
pub fn distinct_sports<'a>(fields: impl IntoIterator<Item = Option<&'a str>>) -> SportsIndex {
    let set: BTreeSet<String> = fields
        .into_iter()
        .flatten()
        .flat_map(|raw| SportsField::parse(raw).names())
        .collect();

    let sports: Vec<String> = set.into_iter().collect();
    SportsIndex {
        total_count: sports.len(),
        sports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_text_becomes_a_list() {
        assert_eq!(
            SportsField::parse("['Tennis', \"Beach-volley\"]"),
            SportsField::List(vec!["Tennis".into(), "Beach-volley".into()])
        );
        assert_eq!(SportsField::parse("[]"), SportsField::List(vec![]));
        assert_eq!(
            SportsField::parse(r"['Jeu d\'eau']"),
            SportsField::List(vec!["Jeu d'eau".into()])
        );
    }

    #[test]
    fn broken_list_falls_back_to_raw_text() {
        for raw in ["[Tennis, Volley]", "['Tennis'", "['Tennis' 'Volley']", "['open"] {
            assert_eq!(SportsField::parse(raw), SportsField::Scalar(raw.to_string()), "{raw}");
        }
        assert_eq!(SportsField::parse("Natation"), SportsField::Scalar("Natation".into()));
    }

    #[test]
    fn distinct_sports_dedups_and_sorts() {
        let index = distinct_sports([Some("Tennis"), Some("['Tennis','Volley']"), None, Some("  ")]);
        assert_eq!(index.sports, vec!["Tennis", "Volley"]);
        assert_eq!(index.total_count, 2);
    }

    #[test]
    fn dedup_is_case_sensitive() {
        let index = distinct_sports([Some("tennis"), Some(" Tennis ")]);
        assert_eq!(index.sports, vec!["Tennis", "tennis"]);
    }

    #[test]
    fn list_serializes_as_json_array() {
        let value = serde_json::to_value(SportsField::parse("['A','B']")).unwrap();
        assert_eq!(value, serde_json::json!(["A", "B"]));
        let value = serde_json::to_value(SportsField::parse("Judo")).unwrap();
        assert_eq!(value, serde_json::json!("Judo"));
    }
}

use once_cell::sync::Lazy;
use regex::Regex;

use super::registry::TagSpec;

static FIELD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\w+)\s*:\s*(.*)$").expect("field line pattern"));

// ── FieldMap ──────────────────────────────────────────────────────────────────

/// Ordered `key -> value` pairs parsed from a block body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key` when present and not blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back to `key: value` lines in insertion order.
    pub fn to_body(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Drop whitespace-only lines at the very start and end of a body.
fn trim_blank_lines(body: &str) -> Vec<&str> {
    let lines: Vec<&str> = body.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

fn append_line(value: &mut String, line: &str) {
    if !value.is_empty() {
        value.push('\n');
    }
    value.push_str(line);
}

/// Parse `key: value` lines.
///
/// A line that does not start a new field continues the previous one. Once the
/// `absorbing` field starts, every remaining line belongs to it verbatim.
/// Text before the first field goes to `implicit` when given, else is dropped.
pub fn parse_fields(body: &str, absorbing: Option<&str>, implicit: Option<&str>) -> FieldMap {
    let mut fields = FieldMap::new();
    let mut current: Option<(String, String)> = None;
    let mut leading = String::new();
    let mut absorbing_now = false;

    for line in trim_blank_lines(body) {
        if absorbing_now {
            if let Some((_, value)) = current.as_mut() {
                append_line(value, line);
            }
            continue;
        }
        if let Some(caps) = FIELD_LINE.captures(line) {
            if let Some((key, value)) = current.take() {
                fields.insert(key, value.trim_end());
            }
            let key = caps[1].to_string();
            absorbing_now = absorbing == Some(key.as_str());
            let first = if absorbing_now { &caps[2] } else { caps[2].trim_end() };
            current = Some((key, first.to_string()));
        } else if let Some((_, value)) = current.as_mut() {
            append_line(value, line);
        } else {
            append_line(&mut leading, line);
        }
    }

    if let Some((key, value)) = current {
        if absorbing_now {
            fields.insert(key, value);
        } else {
            fields.insert(key, value.trim_end());
        }
    }
    if let Some(key) = implicit {
        let leading = leading.trim();
        if !leading.is_empty() && fields.get(key).is_none() {
            fields.insert(key, leading);
        }
    }
    fields
}

impl TagSpec {
    /// Parse a block body with this tag's absorbing and implicit field rules.
    pub fn parse_fields(&self, body: &str) -> FieldMap {
        parse_fields(body, self.absorbing, self.implicit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::registry::lookup;

    #[test]
    fn verbatim_content_field() {
        let spec = lookup("CreateFile").unwrap();
        let fields = spec.parse_fields("name: a.js\ncontent: line1\nline2");
        assert_eq!(fields.get("name"), Some("a.js"));
        assert_eq!(fields.get("content"), Some("line1\nline2"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn absorbing_field_ignores_key_shaped_lines() {
        let spec = lookup("CreateFile").unwrap();
        let body = "\nname: cfg.yml\npath: conf\ncontent: server:\n  port: 80\nname: other\n";
        let fields = spec.parse_fields(body);
        assert_eq!(fields.get("name"), Some("cfg.yml"));
        assert_eq!(fields.get("path"), Some("conf"));
        assert_eq!(fields.get("content"), Some("server:\n  port: 80\nname: other"));
    }

    #[test]
    fn content_starting_on_next_line() {
        let fields = parse_fields("name: a\ncontent:\nfn main() {}\n", Some("content"), None);
        assert_eq!(fields.get("content"), Some("fn main() {}"));
    }

    #[test]
    fn structured_fields_split_on_key_lines() {
        let fields = parse_fields("path: a\nnewName: b", None, None);
        assert_eq!(fields.iter().collect::<Vec<_>>(), vec![("path", "a"), ("newName", "b")]);
    }

    #[test]
    fn continuation_lines_keep_internal_blank_lines() {
        let fields = parse_fields("note: one\n\ntwo\nkey: v", None, None);
        assert_eq!(fields.get("note"), Some("one\n\ntwo"));
        assert_eq!(fields.get("key"), Some("v"));
    }

    #[test]
    fn implicit_field_from_bare_body() {
        let spec = lookup("DeleteFile").unwrap();
        assert_eq!(spec.parse_fields("  a/b.txt \n").get("path"), Some("a/b.txt"));
    }

    #[test]
    fn explicit_key_beats_implicit_text() {
        let fields = parse_fields("stray\npath: real", None, Some("path"));
        assert_eq!(fields.get("path"), Some("real"));
    }

    #[test]
    fn keys_are_case_sensitive_and_trimmed() {
        let fields = parse_fields("  ACTION :  xem_hom_nay  \r\n", None, None);
        assert_eq!(fields.get("ACTION"), Some("xem_hom_nay"));
        assert_eq!(fields.get("action"), None);
    }

    #[test]
    fn to_body_round_trips_order() {
        let fields = parse_fields("b: 2\na: 1", None, None);
        assert_eq!(fields.to_body(), "b: 2\na: 1");
    }
}

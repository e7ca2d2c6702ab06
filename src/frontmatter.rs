//! Frontmatter Parser
//!
//! Flat `key: value` header between `---` lines. Deliberately not YAML:
//! no nesting, no lists, and malformed lines are skipped rather than reported.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FrontmatterValue {
    String(String),
    Bool(bool),
    Integer(i64),
    Decimal(f64),
}

impl FrontmatterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FrontmatterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Empty strings and `false` count as absent, matching how the
    /// protocol checks treat optional keys.
    pub fn is_truthy(&self) -> bool {
        match self {
            FrontmatterValue::String(s) => !s.is_empty(),
            FrontmatterValue::Bool(b) => *b,
            FrontmatterValue::Integer(i) => *i != 0,
            FrontmatterValue::Decimal(d) => *d != 0.0,
        }
    }
}

impl fmt::Display for FrontmatterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontmatterValue::String(s) => f.write_str(s),
            FrontmatterValue::Bool(b) => write!(f, "{}", b),
            FrontmatterValue::Integer(i) => write!(f, "{}", i),
            FrontmatterValue::Decimal(d) => write!(f, "{}", d),
        }
    }
}

impl Serialize for FrontmatterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FrontmatterValue::String(s) => serializer.serialize_str(s),
            FrontmatterValue::Bool(b) => serializer.serialize_bool(*b),
            FrontmatterValue::Integer(i) => serializer.serialize_i64(*i),
            FrontmatterValue::Decimal(d) => serializer.serialize_f64(*d),
        }
    }
}

impl From<&str> for FrontmatterValue {
    fn from(s: &str) -> Self {
        FrontmatterValue::String(s.to_string())
    }
}

impl From<bool> for FrontmatterValue {
    fn from(b: bool) -> Self {
        FrontmatterValue::Bool(b)
    }
}

impl From<i64> for FrontmatterValue {
    fn from(i: i64) -> Self {
        FrontmatterValue::Integer(i)
    }
}

/// Insertion-ordered scalar mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    entries: Vec<(String, FrontmatterValue)>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an existing key in place; new keys are appended.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FrontmatterValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FrontmatterValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrontmatterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Frontmatter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument<'a> {
    pub frontmatter: Frontmatter,
    pub content: &'a str,
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == "---"
}

/// Split `source` into frontmatter and body. Never fails.
pub fn parse_frontmatter(source: &str) -> ParsedDocument<'_> {
    let no_block = ParsedDocument {
        frontmatter: Frontmatter::new(),
        content: source,
    };

    let Some(first_nl) = source.find('\n') else {
        return no_block;
    };
    if !is_delimiter(&source[..first_nl]) {
        return no_block;
    }

    // the closing delimiter must be a complete line, newline included
    let block_start = first_nl + 1;
    let mut offset = block_start;
    while let Some(i) = source[offset..].find('\n') {
        let next = offset + i + 1;
        if is_delimiter(&source[offset..offset + i]) {
            return ParsedDocument {
                frontmatter: parse_block(&source[block_start..offset]),
                content: &source[next..],
            };
        }
        offset = next;
    }

    no_block
}

fn parse_block(block: &str) -> Frontmatter {
    let mut fm = Frontmatter::new();
    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, raw)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        fm.insert(key, parse_scalar(raw.trim()));
    }
    fm
}

/// Quotes are stripped first; the literal rules then apply to what is left.
fn parse_scalar(raw: &str) -> FrontmatterValue {
    let raw = strip_quotes(raw);

    match raw {
        "true" => return FrontmatterValue::Bool(true),
        "false" => return FrontmatterValue::Bool(false),
        _ => {}
    }

    if is_digits(raw) {
        if let Ok(i) = raw.parse::<i64>() {
            return FrontmatterValue::Integer(i);
        }
    }

    if let Some((int, frac)) = raw.split_once('.') {
        if is_digits(int) && is_digits(frac) {
            if let Ok(d) = raw.parse::<f64>() {
                return FrontmatterValue::Decimal(d);
            }
        }
    }

    FrontmatterValue::String(raw.to_string())
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

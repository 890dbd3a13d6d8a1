//! Filter expressions over the `metadata` region.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! select * from /<region> where <field> = '<literal>'
//! ```
//!
//! A single quote inside the literal is written as `''`.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::{Region, StoreError};

/// Equality match on one top-level field of stored values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    region: Region,
    field: String,
    literal: String,
}

impl Query {
    pub fn new(region: Region, field: impl Into<String>, literal: impl Into<String>) -> Self {
        Self {
            region,
            field: field.into(),
            literal: literal.into(),
        }
    }

    /// All records whose `parent` is exactly `dir`.
    pub fn parent_equals(dir: &str) -> Self {
        Self::new(Region::Metadata, "parent", dir)
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// Strings compare verbatim; other scalars compare by their JSON text.
    pub fn matches(&self, value: &Value) -> bool {
        match value.get(&self.field) {
            Some(Value::String(s)) => *s == self.literal,
            Some(Value::Null) | None => false,
            Some(Value::Array(_)) | Some(Value::Object(_)) => false,
            Some(other) => other.to_string() == self.literal,
        }
    }

    pub fn matches_raw(&self, raw: &[u8]) -> Result<bool, StoreError> {
        let value: Value = serde_json::from_slice(raw)?;
        Ok(self.matches(&value))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "select * from /{} where {} = '{}'",
            self.region,
            self.field,
            self.literal.replace('\'', "''")
        )
    }
}

impl FromStr for Query {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidQuery(s.to_string());

        let rest = strip_keyword(s, "select").ok_or_else(invalid)?;
        let rest = rest.trim_start().strip_prefix('*').ok_or_else(invalid)?;
        let rest = strip_keyword(rest, "from").ok_or_else(invalid)?;
        let rest = rest.trim_start().strip_prefix('/').ok_or_else(invalid)?;
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let region: Region = rest[..end].parse()?;
        if region != Region::Metadata {
            return Err(invalid());
        }

        let rest = strip_keyword(&rest[end..], "where").ok_or_else(invalid)?;
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(invalid());
        }
        let field = &rest[..end];

        let rest = rest[end..].trim_start().strip_prefix('=').ok_or_else(invalid)?;
        let rest = rest.trim_start().strip_prefix('\'').ok_or_else(invalid)?;
        let (literal, consumed) = read_literal(rest).ok_or_else(invalid)?;
        if !rest[consumed..].trim().is_empty() {
            return Err(invalid());
        }

        Ok(Query::new(region, field, literal))
    }
}

/// Strip a leading keyword that must be followed by whitespace.
fn strip_keyword<'a>(s: &'a str, kw: &str) -> Option<&'a str> {
    let s = s.trim_start();
    if !s.is_char_boundary(kw.len()) {
        return None;
    }
    let (head, tail) = s.split_at(kw.len());
    (head.eq_ignore_ascii_case(kw) && tail.starts_with(char::is_whitespace)).then_some(tail)
}

/// Read a quoted literal body (opening quote already consumed). Returns the
/// unescaped text and the byte length consumed including the closing quote.
fn read_literal(s: &str) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '\'' {
            out.push(c);
            continue;
        }
        if let Some(&(_, '\'')) = chars.peek() {
            chars.next();
            out.push('\'');
        } else {
            return Some((out, i + 1));
        }
    }
    None
}

use crate::error::{QuiesceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectName {
    pub database: String,
    pub table: String,
}

impl ObjectName {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Parses `db.table`, with either part optionally wrapped in backquotes.
impl FromStr for ObjectName {
    type Err = QuiesceError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (database, table) = split_qualified(s)
            .ok_or_else(|| QuiesceError::Parse(format!("expected db.table, got '{}'", s)))?;
        if database.is_empty() || table.is_empty() {
            return Err(QuiesceError::Parse(format!(
                "empty identifier in '{}'",
                s
            )));
        }
        Ok(ObjectName::new(database, table))
    }
}

fn split_qualified(s: &str) -> Option<(String, String)> {
    let (database, rest) = take_identifier(s)?;
    let rest = rest.strip_prefix('.')?;
    let (table, rest) = take_identifier(rest)?;
    if !rest.is_empty() {
        return None;
    }
    Some((database, table))
}

fn take_identifier(s: &str) -> Option<(String, &str)> {
    if let Some(quoted) = s.strip_prefix('`') {
        // `` inside a quoted identifier stands for a literal backquote
        let mut ident = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c == '`' {
                if let Some((_, '`')) = chars.peek() {
                    chars.next();
                    ident.push('`');
                    continue;
                }
                return Some((ident, &quoted[idx + 1..]));
            }
            ident.push(c);
        }
        None
    } else {
        let end = s.find('.').unwrap_or(s.len());
        Some((s[..end].to_string(), &s[end..]))
    }
}

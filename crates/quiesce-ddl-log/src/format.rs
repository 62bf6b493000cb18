//! Line format of the DDL audit log
//!
//! Each record is one line of twelve tab-separated fields:
//!
//! ```text
//! timestamp  query  src_engine  src_partitioned  src_db  src_table  src_id
//!                   tgt_engine  tgt_partitioned  tgt_db  tgt_table  tgt_id
//! ```
//!
//! - `timestamp` is RFC 3339 UTC with second precision
//! - `query` and the engine names have `\`, tab, CR and LF escaped as
//!   `\\`, `\t`, `\r`, `\n`
//! - partitioned flags are `1` or `0`
//! - database and table names use the filename-safe encoding from
//!   [`encode_identifier`]
//! - ids are hyphenated UUIDs, or empty when the object has none

use chrono::{DateTime, SecondsFormat, Utc};
use quiesce_core::{DdlLogRecord, DdlObjectInfo, QuiesceError, Result};
use std::fmt;
use uuid::Uuid;

const FIELD_COUNT: usize = 12;

/// Encode an identifier so it can be used as a file name.
///
/// ASCII letters, digits and `_` are kept; every other UTF-16 code unit is
/// written as `@` followed by four lowercase hex digits.
pub fn encode_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for unit in name.encode_utf16() {
        match u8::try_from(unit) {
            Ok(b) if b.is_ascii_alphanumeric() || b == b'_' => out.push(char::from(b)),
            _ => out.push_str(&format!("@{:04x}", unit)),
        }
    }
    out
}

/// Inverse of [`encode_identifier`].
pub fn decode_identifier(encoded: &str) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c == '@' {
            let hex: String = chars.by_ref().take(4).collect();
            if hex.len() != 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(QuiesceError::Parse(format!(
                    "bad escape '@{}' in identifier '{}'",
                    hex, encoded
                )));
            }
            let unit = u16::from_str_radix(&hex, 16).map_err(|_| {
                QuiesceError::Parse(format!("bad escape '@{}' in identifier '{}'", hex, encoded))
            })?;
            units.push(unit);
        } else if c.is_ascii_alphanumeric() || c == '_' {
            units.push(c as u16);
        } else {
            return Err(QuiesceError::Parse(format!(
                "unexpected '{}' in encoded identifier '{}'",
                c, encoded
            )));
        }
    }
    String::from_utf16(&units)
        .map_err(|_| QuiesceError::Parse(format!("invalid UTF-16 in identifier '{}'", encoded)))
}

/// Escape free text such as a statement so it fits in a single field.
pub fn escape_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_field`].
pub fn unescape_field(escaped: &str) -> Result<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            other => {
                return Err(QuiesceError::Parse(format!(
                    "bad escape sequence {:?} in field",
                    other
                )))
            }
        }
    }
    Ok(out)
}

/// A record rendered as one audit log line (without the trailing newline).
pub struct DdlLogLine<'a>(pub &'a DdlLogRecord);

impl DdlLogLine<'_> {
    /// Parse one line back into a record. A trailing newline is accepted.
    pub fn parse(line: &str) -> Result<DdlLogRecord> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(QuiesceError::Parse(format!(
                "expected {} fields, found {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let timestamp = DateTime::parse_from_rfc3339(fields[0])
            .map_err(|e| QuiesceError::Parse(format!("bad timestamp '{}': {}", fields[0], e)))?
            .with_timezone(&Utc);

        Ok(DdlLogRecord {
            timestamp,
            query: unescape_field(fields[1])?,
            source: parse_object(&fields[2..7])?,
            target: parse_object(&fields[7..12])?,
        })
    }
}

impl fmt::Display for DdlLogLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        write!(
            f,
            "{}\t{}\t",
            record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            escape_field(&record.query)
        )?;
        write_object(f, &record.source)?;
        f.write_str("\t")?;
        write_object(f, &record.target)
    }
}

fn write_object(f: &mut fmt::Formatter<'_>, info: &DdlObjectInfo) -> fmt::Result {
    let id = info
        .id
        .map(|id| id.hyphenated().to_string())
        .unwrap_or_default();
    write!(
        f,
        "{}\t{}\t{}\t{}\t{}",
        escape_field(&info.engine),
        if info.partitioned { '1' } else { '0' },
        encode_identifier(&info.database),
        encode_identifier(&info.table),
        id
    )
}

fn parse_object(fields: &[&str]) -> Result<DdlObjectInfo> {
    let partitioned = match fields[1] {
        "1" => true,
        "0" => false,
        other => {
            return Err(QuiesceError::Parse(format!(
                "partitioned flag must be 0 or 1, got '{}'",
                other
            )))
        }
    };
    let id = if fields[4].is_empty() {
        None
    } else {
        Some(
            Uuid::parse_str(fields[4])
                .map_err(|e| QuiesceError::Parse(format!("bad id '{}': {}", fields[4], e)))?,
        )
    };
    Ok(DdlObjectInfo {
        engine: unescape_field(fields[0])?,
        partitioned,
        database: decode_identifier(fields[2])?,
        table: decode_identifier(fields[3])?,
        id,
    })
}

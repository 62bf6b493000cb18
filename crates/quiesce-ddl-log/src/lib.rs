//! DDL audit log
//!
//! While a backup is running, every DDL statement and rename is appended to a
//! plain text file so the external backup tool can replay it against the
//! files it copied.
//!
//! Features:
//! - One tab-separated record per line, written with a single write call
//! - Filename-safe identifier encoding that round-trips arbitrary Unicode
//! - Sticky error flag: after the first failed write, further records are
//!   dropped instead of producing a log with holes in the middle
//! - A parser for the format, used by the backup tool side

mod format;
mod store;

pub use format::{
    decode_identifier, encode_identifier, escape_field, unescape_field, DdlLogLine,
};
pub use store::DdlLog;

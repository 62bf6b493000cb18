//! `BACKUP STAGE`, `BACKUP LOCK` and `BACKUP UNLOCK` statements

use crate::coordinator::BackupCoordinator;
use crate::session::Session;
use quiesce_core::{BackupStage, ObjectName, QuiesceError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatement {
    Stage(BackupStage),
    Lock(ObjectName),
    Unlock,
}

impl BackupStatement {
    /// Parse a statement. Keywords are case-insensitive and a trailing `;`
    /// is allowed.
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim().trim_end_matches(';').trim_end();
        let unknown = || QuiesceError::Parse(format!("unknown statement '{}'", input.trim()));

        let rest = strip_keyword(text, "BACKUP").ok_or_else(unknown)?;
        if let Some(stage) = strip_keyword(rest, "STAGE") {
            return Ok(BackupStatement::Stage(stage.parse()?));
        }
        if let Some(object) = strip_keyword(rest, "LOCK") {
            return Ok(BackupStatement::Lock(object.parse()?));
        }
        if let Some(tail) = strip_keyword(rest, "UNLOCK") {
            if tail.is_empty() {
                return Ok(BackupStatement::Unlock);
            }
        }
        Err(unknown())
    }

    /// Run the statement on behalf of `session`.
    pub fn execute(&self, coordinator: &BackupCoordinator, session: &mut Session) -> Result<()> {
        match self {
            BackupStatement::Stage(stage) => coordinator.run_stage(session, *stage),
            BackupStatement::Lock(object) => coordinator.backup_lock(session, object),
            BackupStatement::Unlock => {
                coordinator.backup_unlock(session);
                Ok(())
            }
        }
    }
}

impl FromStr for BackupStatement {
    type Err = QuiesceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BackupStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupStatement::Stage(stage) => write!(f, "BACKUP STAGE {}", stage),
            BackupStatement::Lock(object) => write!(f, "BACKUP LOCK {}", object),
            BackupStatement::Unlock => f.write_str("BACKUP UNLOCK"),
        }
    }
}

/// `text` with a leading keyword and the whitespace after it removed.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let tail = &text[keyword.len()..];
    match tail.chars().next() {
        None => Some(tail),
        Some(c) if c.is_whitespace() => Some(tail.trim_start()),
        Some(_) => None,
    }
}

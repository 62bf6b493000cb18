use crate::error::{QuiesceError, Result};
use crate::types::lock::LockMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stages of the backup quiescence protocol, in escalation order.
///
/// `Finished` is the idle sentinel: a session with no backup in progress sits
/// at `Finished`, and `End` returns it there.
///
/// `Ord` is request order only. The five requestable stages compare in the
/// order they must be requested and `Finished` sorts after all of them, so
/// `Finished > End` even though a new backup leaves `Finished` for `Start`.
/// The cyclic order `End -> Finished -> Start` is given by [`next`], and
/// callers must handle `Finished` before comparing stages.
///
/// [`next`]: BackupStage::next
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStage {
    Start,
    Flush,
    BlockDdl,
    BlockCommit,
    End,
    #[default]
    Finished,
}

impl BackupStage {
    /// The five stages a caller may request, in order.
    pub const REQUESTABLE: [BackupStage; 5] = [
        BackupStage::Start,
        BackupStage::Flush,
        BackupStage::BlockDdl,
        BackupStage::BlockCommit,
        BackupStage::End,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BackupStage::Start => "START",
            BackupStage::Flush => "FLUSH",
            BackupStage::BlockDdl => "BLOCK_DDL",
            BackupStage::BlockCommit => "BLOCK_COMMIT",
            BackupStage::End => "END",
            BackupStage::Finished => "FINISHED",
        }
    }

    /// The stage that follows `self` in a forward walk.
    ///
    /// `Finished` is followed by `Start`; `End` is followed by `Finished`.
    pub fn next(self) -> BackupStage {
        match self {
            BackupStage::Finished => BackupStage::Start,
            BackupStage::Start => BackupStage::Flush,
            BackupStage::Flush => BackupStage::BlockDdl,
            BackupStage::BlockDdl => BackupStage::BlockCommit,
            BackupStage::BlockCommit => BackupStage::End,
            BackupStage::End => BackupStage::Finished,
        }
    }

    /// Level the escalation ticket holds once this stage has completed.
    ///
    /// `None` for `End` and `Finished`, when no ticket exists.
    pub fn held_level(self) -> Option<LockMode> {
        match self {
            BackupStage::Start => Some(LockMode::BackupRunning),
            BackupStage::Flush => Some(LockMode::BackupFlush),
            BackupStage::BlockDdl => Some(LockMode::BackupBlockDdl),
            BackupStage::BlockCommit => Some(LockMode::BackupBlockCommit),
            BackupStage::End | BackupStage::Finished => None,
        }
    }

    /// True for the stages during which a backup holds the escalation ticket.
    pub fn is_in_progress(self) -> bool {
        !matches!(self, BackupStage::End | BackupStage::Finished)
    }
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackupStage {
    type Err = QuiesceError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace(' ', "_");
        match normalized.as_str() {
            "START" => Ok(BackupStage::Start),
            "FLUSH" => Ok(BackupStage::Flush),
            "BLOCK_DDL" => Ok(BackupStage::BlockDdl),
            "BLOCK_COMMIT" => Ok(BackupStage::BlockCommit),
            "END" => Ok(BackupStage::End),
            _ => Err(QuiesceError::Parse(format!("unknown backup stage '{}'", s.trim()))),
        }
    }
}

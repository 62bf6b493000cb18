use crate::types::BackupStage;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuiesceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Backup stage {0} not allowed: no backup is running")]
    NotRunning(BackupStage),

    #[error("Backup stage {requested} must come after current stage {current}")]
    WrongStageOrder {
        requested: BackupStage,
        current: BackupStage,
    },

    #[error("Backup stage {stage} failed: {source}")]
    StageFailed {
        stage: BackupStage,
        #[source]
        source: Box<QuiesceError>,
    },

    #[error("Can't execute the given command because you have active locked tables or an active transaction: {0}")]
    ConflictingSession(String),

    #[error("Lock wait timeout exceeded after {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    #[error("Deadlock found when trying to get lock")]
    Deadlock,

    #[error("Session was killed while waiting")]
    Killed,

    #[error("Storage engine error: {0}")]
    Engine(String),

    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Binary log error: {0}")]
    BinaryLog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl QuiesceError {
    /// Wrap a handler failure as the failure of the requested stage.
    pub fn stage_failed(stage: BackupStage, source: QuiesceError) -> Self {
        QuiesceError::StageFailed {
            stage,
            source: Box::new(source),
        }
    }

    /// True when the lock service gave up because of a wait-for cycle.
    ///
    /// Only this reason is retried by the BLOCK_DDL escalation; a plain
    /// timeout or a kill is terminal.
    pub fn is_deadlock(&self) -> bool {
        match self {
            QuiesceError::Deadlock => true,
            QuiesceError::StageFailed { source, .. } => source.is_deadlock(),
            _ => false,
        }
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, QuiesceError::LockTimeout { .. })
    }

    /// The stage named by a `StageFailed` error, if this is one.
    pub fn failed_stage(&self) -> Option<BackupStage> {
        match self {
            QuiesceError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QuiesceError>;

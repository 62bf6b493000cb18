use crate::types::object::ObjectName;
use crate::types::session::{KillFlag, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Resource protected by the metadata lock service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockKey {
    /// The single hierarchical backup resource every write path touches.
    Backup,
    /// One table.
    Object(ObjectName),
}

impl LockKey {
    /// Whether `mode` belongs to this key's namespace.
    pub fn accepts(&self, mode: LockMode) -> bool {
        match self {
            LockKey::Backup => !mode.is_object_level(),
            LockKey::Object(_) => mode.is_object_level(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Backup => f.write_str("BACKUP"),
            LockKey::Object(name) => write!(f, "TABLE {}", name),
        }
    }
}

/// Lock levels.
///
/// The `Backup*` levels are only ever held by the session running the backup
/// protocol. `Dml` through `Commit` are taken by ordinary statements on the
/// backup key so that escalation can hold them off. `Shared`,
/// `SharedHighPrio` and `Exclusive` live in the per-object namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Acquisition level of BACKUP STAGE START.
    BackupStart,
    /// Held between START and FLUSH: only keeps other backups out.
    BackupRunning,
    /// Blocks new writes to non-transactional tables.
    BackupFlush,
    /// Waits for running writes to non-transactional tables.
    BackupWaitFlush,
    /// Waits for running DDL and blocks new DDL.
    BackupBlockDdl,
    /// Waits for running commits and blocks new ones.
    BackupBlockCommit,

    /// Write to a non-transactional table.
    Dml,
    /// Write to a transactional table.
    TransDml,
    /// Write to a log or statistics table.
    SysDml,
    Ddl,
    /// Data-copy phase of ALTER TABLE.
    AlterCopy,
    Commit,

    Shared,
    /// Object pin taken by BACKUP LOCK.
    SharedHighPrio,
    Exclusive,
}

impl LockMode {
    pub fn is_backup_level(self) -> bool {
        matches!(
            self,
            LockMode::BackupStart
                | LockMode::BackupRunning
                | LockMode::BackupFlush
                | LockMode::BackupWaitFlush
                | LockMode::BackupBlockDdl
                | LockMode::BackupBlockCommit
        )
    }

    pub fn is_object_level(self) -> bool {
        matches!(
            self,
            LockMode::Shared | LockMode::SharedHighPrio | LockMode::Exclusive
        )
    }

    pub fn is_statement_level(self) -> bool {
        !self.is_backup_level() && !self.is_object_level()
    }

    /// Relative strength within a family, used to decide whether an upgrade
    /// or a downgrade has anything to do.
    pub fn rank(self) -> u8 {
        match self {
            LockMode::BackupRunning => 1,
            LockMode::BackupStart => 2,
            LockMode::BackupFlush => 3,
            LockMode::BackupWaitFlush => 4,
            LockMode::BackupBlockDdl => 5,
            LockMode::BackupBlockCommit => 6,

            LockMode::AlterCopy
            | LockMode::TransDml
            | LockMode::Dml
            | LockMode::SysDml
            | LockMode::Commit => 1,
            LockMode::Ddl => 2,

            LockMode::Shared => 1,
            LockMode::SharedHighPrio => 2,
            LockMode::Exclusive => 3,
        }
    }

    pub fn same_family(self, other: LockMode) -> bool {
        (self.is_backup_level() && other.is_backup_level())
            || (self.is_statement_level() && other.is_statement_level())
            || (self.is_object_level() && other.is_object_level())
    }

    /// Does a lock already granted at `granted` (to another owner) keep a
    /// request for `self` waiting?
    ///
    /// The relation is asymmetric: a backup level that only
    /// blocks *new* statements does not wait for the ones already granted.
    pub fn conflicts_with(self, granted: LockMode) -> bool {
        use LockMode::*;

        if self.is_object_level() || granted.is_object_level() {
            return self == Exclusive || granted == Exclusive;
        }
        if self.is_backup_level() && granted.is_backup_level() {
            return true;
        }
        match self {
            BackupWaitFlush => granted == Dml,
            BackupBlockDdl => matches!(granted, Dml | Ddl),
            BackupBlockCommit => matches!(granted, Dml | SysDml | Ddl | Commit),
            Dml => matches!(
                granted,
                BackupFlush | BackupWaitFlush | BackupBlockDdl | BackupBlockCommit
            ),
            Ddl => matches!(granted, BackupBlockDdl | BackupBlockCommit),
            SysDml | AlterCopy | Commit => granted == BackupBlockCommit,
            _ => false,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockMode::BackupStart => "BACKUP_START",
            LockMode::BackupRunning => "BACKUP_RUNNING",
            LockMode::BackupFlush => "BACKUP_FLUSH",
            LockMode::BackupWaitFlush => "BACKUP_WAIT_FLUSH",
            LockMode::BackupBlockDdl => "BACKUP_BLOCK_DDL",
            LockMode::BackupBlockCommit => "BACKUP_BLOCK_COMMIT",
            LockMode::Dml => "BACKUP_DML",
            LockMode::TransDml => "BACKUP_TRANS_DML",
            LockMode::SysDml => "BACKUP_SYS_DML",
            LockMode::Ddl => "BACKUP_DDL",
            LockMode::AlterCopy => "BACKUP_ALTER_COPY",
            LockMode::Commit => "BACKUP_COMMIT",
            LockMode::Shared => "SHARED",
            LockMode::SharedHighPrio => "SHARED_HIGH_PRIO",
            LockMode::Exclusive => "EXCLUSIVE",
        };
        f.write_str(name)
    }
}

/// How long a lock is meant to live. The lock service does not release
/// anything on its own; the duration records who is responsible for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockDuration {
    Statement,
    Transaction,
    Explicit,
}

/// Handle to a granted lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub key: LockKey,
    pub mode: LockMode,
    pub duration: LockDuration,
}

impl LockRequest {
    pub fn new(key: LockKey, mode: LockMode, duration: LockDuration) -> Self {
        Self {
            key,
            mode,
            duration,
        }
    }

    pub fn backup(mode: LockMode, duration: LockDuration) -> Self {
        Self::new(LockKey::Backup, mode, duration)
    }

    pub fn object(name: ObjectName, mode: LockMode, duration: LockDuration) -> Self {
        Self::new(LockKey::Object(name), mode, duration)
    }
}

/// Who is waiting, how long they may wait, and how they get cancelled.
#[derive(Debug, Clone, Copy)]
pub struct LockWaiter<'a> {
    pub owner: SessionId,
    pub kill: &'a KillFlag,
    pub timeout: Duration,
}

/// Snapshot of one granted lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedLock {
    pub ticket: TicketId,
    pub owner: SessionId,
    pub mode: LockMode,
    pub duration: LockDuration,
}

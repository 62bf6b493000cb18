//! Per-connection state the backup protocol reads and updates
//!
//! A `Session` is owned by the thread serving one client. Every coordinator
//! call takes it by `&mut`, so none of its fields need locking; only the kill
//! flag is shared with other threads.

use crate::protection::StatementClass;
use quiesce_core::{BackupStage, KillFlag, SessionId, TicketId};

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    kill: KillFlag,

    pub(crate) backup_stage: BackupStage,
    /// This session's BLOCK_DDL desynced replication; END must resync.
    pub(crate) caused_desync: bool,

    locked_tables: bool,
    in_transaction: bool,
    holds_global_read_lock: bool,

    /// Backup namespace lock of the running statement.
    pub(crate) statement_ticket: Option<TicketId>,
    pub(crate) statement_class: Option<StatementClass>,
    pub(crate) object_tickets: Vec<TicketId>,

    /// Object pinned by BACKUP LOCK.
    pub(crate) backup_lock: Option<TicketId>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            kill: KillFlag::new(),
            backup_stage: BackupStage::Finished,
            caused_desync: false,
            locked_tables: false,
            in_transaction: false,
            holds_global_read_lock: false,
            statement_ticket: None,
            statement_class: None,
            object_tickets: Vec::new(),
            backup_lock: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Handle other threads can use to kill this session.
    pub fn kill_flag(&self) -> KillFlag {
        self.kill.clone()
    }

    pub fn is_killed(&self) -> bool {
        self.kill.is_killed()
    }

    /// Last backup stage this session completed, `Finished` when idle.
    pub fn backup_stage(&self) -> BackupStage {
        self.backup_stage
    }

    pub fn caused_desync(&self) -> bool {
        self.caused_desync
    }

    /// Whether the session is in LOCK TABLES mode.
    pub fn locked_tables(&self) -> bool {
        self.locked_tables
    }

    pub fn set_locked_tables(&mut self, locked: bool) {
        self.locked_tables = locked;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn set_in_transaction(&mut self, active: bool) {
        self.in_transaction = active;
    }

    /// Whether the session holds FLUSH TABLES WITH READ LOCK.
    pub fn holds_global_read_lock(&self) -> bool {
        self.holds_global_read_lock
    }

    pub fn set_global_read_lock(&mut self, held: bool) {
        self.holds_global_read_lock = held;
    }

    pub fn statement_ticket(&self) -> Option<TicketId> {
        self.statement_ticket
    }

    pub fn backup_lock_ticket(&self) -> Option<TicketId> {
        self.backup_lock
    }
}

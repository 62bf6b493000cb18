//! Process-wide backup state and its collaborators
//!
//! # Example
//!
//! ```no_run
//! use quiesce::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let coordinator = BackupCoordinator::builder(BackupConfig::new("./data")).build()?;
//! let mut session = coordinator.new_session();
//!
//! coordinator.run_stage(&mut session, BackupStage::Start)?;
//! coordinator.run_stage(&mut session, BackupStage::BlockCommit)?;
//! // copy files here
//! coordinator.run_stage(&mut session, BackupStage::End)?;
//! # Ok(())
//! # }
//! ```

use crate::session::Session;
use parking_lot::Mutex;
use quiesce_core::{
    BackupConfig, BackupStage, BinaryLog, DdlLogRecord, KillFlag, LockManager, LockMode,
    LockWaiter, MetadataLocks, NoBinaryLog, NoReplication, NullTableCache, QuiesceError,
    ReplicationCoordinator, Result, SessionId, StorageEngine, TableCache, TicketId,
};
use quiesce_ddl_log::DdlLog;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The escalation ticket and who owns it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveBackup {
    pub(crate) owner: SessionId,
    pub(crate) ticket: TicketId,
    pub(crate) stage: BackupStage,
}

/// Snapshot of the coordinator, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatus {
    /// Session running the backup, if any
    pub owner: Option<SessionId>,
    /// Last completed stage of that session
    pub stage: BackupStage,
    /// Level currently held by the escalation ticket
    pub level: Option<LockMode>,
    pub ddl_log_open: bool,
    /// Best-effort flush failures seen during the current backup
    pub flush_failures: u64,
}

/// Builder for [`BackupCoordinator`]
pub struct BackupCoordinatorBuilder {
    config: BackupConfig,
    locks: Option<Arc<dyn MetadataLocks>>,
    engines: Vec<Arc<dyn StorageEngine>>,
    tables: Arc<dyn TableCache>,
    replication: Arc<dyn ReplicationCoordinator>,
    binlog: Arc<dyn BinaryLog>,
}

impl BackupCoordinatorBuilder {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            locks: None,
            engines: Vec::new(),
            tables: Arc::new(NullTableCache),
            replication: Arc::new(NoReplication),
            binlog: Arc::new(NoBinaryLog),
        }
    }

    /// Use an external lock service instead of an in-process [`LockManager`].
    pub fn with_lock_service(mut self, locks: Arc<dyn MetadataLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Register a storage engine; hooks run in registration order.
    pub fn with_engine(mut self, engine: Arc<dyn StorageEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn with_table_cache(mut self, tables: Arc<dyn TableCache>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_replication(mut self, replication: Arc<dyn ReplicationCoordinator>) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_binary_log(mut self, binlog: Arc<dyn BinaryLog>) -> Self {
        self.binlog = binlog;
        self
    }

    pub fn build(self) -> Result<BackupCoordinator> {
        self.config.validate()?;
        let locks = match self.locks {
            Some(locks) => locks,
            None => Arc::new(LockManager::new(self.config.kill_poll_interval())),
        };
        Ok(BackupCoordinator {
            config: self.config,
            locks,
            engines: self.engines,
            tables: self.tables,
            replication: self.replication,
            binlog: self.binlog,
            ddl_log: DdlLog::new(),
            active: Mutex::new(None),
            flush_failures: AtomicU64::new(0),
            next_session: AtomicU64::new(1),
        })
    }
}

/// Owner of the global backup state
///
/// Holds the single escalation ticket slot, the DDL audit log and the
/// collaborators the stage handlers call. Share it between session threads
/// with an `Arc`.
pub struct BackupCoordinator {
    pub(crate) config: BackupConfig,
    pub(crate) locks: Arc<dyn MetadataLocks>,
    pub(crate) engines: Vec<Arc<dyn StorageEngine>>,
    pub(crate) tables: Arc<dyn TableCache>,
    pub(crate) replication: Arc<dyn ReplicationCoordinator>,
    pub(crate) binlog: Arc<dyn BinaryLog>,
    pub(crate) ddl_log: DdlLog,
    active: Mutex<Option<ActiveBackup>>,
    pub(crate) flush_failures: AtomicU64,
    next_session: AtomicU64,
}

impl BackupCoordinator {
    pub fn builder(config: BackupConfig) -> BackupCoordinatorBuilder {
        BackupCoordinatorBuilder::new(config)
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// The lock service every protocol and statement lock goes through.
    pub fn locks(&self) -> &Arc<dyn MetadataLocks> {
        &self.locks
    }

    pub fn ddl_log(&self) -> &DdlLog {
        &self.ddl_log
    }

    /// Record a DDL statement in the audit log. Dropped when no backup is
    /// running.
    pub fn log_ddl(&self, record: &DdlLogRecord) {
        self.ddl_log.log(record);
    }

    /// A fresh session with a process-unique id.
    pub fn new_session(&self) -> Session {
        Session::new(SessionId(self.next_session.fetch_add(1, Ordering::Relaxed)))
    }

    /// Release everything a disconnecting session still holds.
    ///
    /// Ends a backup it was running, drops its BACKUP LOCK and its
    /// statement locks.
    pub fn close_session(&self, session: &mut Session) {
        if session.backup_stage != BackupStage::Finished {
            tracing::warn!("{} disconnected during a backup, ending it", session.id());
        }
        self.teardown_backup(session);
        self.backup_unlock(session);
        self.end_statement(session);
    }

    pub fn status(&self) -> BackupStatus {
        let active = *self.active.lock();
        BackupStatus {
            owner: active.map(|a| a.owner),
            stage: active.map(|a| a.stage).unwrap_or_default(),
            level: active.and_then(|a| self.locks.mode_of(a.ticket)),
            ddl_log_open: self.ddl_log.is_open(),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn waiter<'a>(&self, owner: SessionId, kill: &'a KillFlag) -> LockWaiter<'a> {
        LockWaiter {
            owner,
            kill,
            timeout: self.config.lock_wait_timeout(),
        }
    }

    /// Put a freshly acquired ticket into the global slot.
    pub(crate) fn install_ticket(&self, owner: SessionId, ticket: TicketId) -> Result<()> {
        let mut slot = self.active.lock();
        if let Some(active) = slot.as_ref() {
            return Err(QuiesceError::InvalidState(format!(
                "backup already running in {}",
                active.owner
            )));
        }
        *slot = Some(ActiveBackup {
            owner,
            ticket,
            stage: BackupStage::Start,
        });
        Ok(())
    }

    /// The escalation ticket, provided `owner` holds it.
    pub(crate) fn ticket_of(&self, owner: SessionId) -> Result<TicketId> {
        match *self.active.lock() {
            Some(active) if active.owner == owner => Ok(active.ticket),
            Some(active) => Err(QuiesceError::InvalidState(format!(
                "backup is owned by {}, not {}",
                active.owner, owner
            ))),
            None => Err(QuiesceError::InvalidState("no backup ticket".into())),
        }
    }

    /// Remove `owner`'s ticket from the slot, if it holds it.
    pub(crate) fn take_ticket(&self, owner: SessionId) -> Option<ActiveBackup> {
        let mut slot = self.active.lock();
        match *slot {
            Some(active) if active.owner == owner => slot.take(),
            _ => None,
        }
    }

    /// Record a completed (or reverted) stage on the session and the slot.
    pub(crate) fn set_stage(&self, session: &mut Session, stage: BackupStage) {
        session.backup_stage = stage;
        if let Some(active) = self.active.lock().as_mut() {
            if active.owner == session.id() {
                active.stage = stage;
            }
        }
    }
}

//! BACKUP LOCK / BACKUP UNLOCK
//!
//! Lets a backup tool pin one table against DDL while it copies that
//! table's files, independently of the staged protocol.

use crate::coordinator::BackupCoordinator;
use crate::session::Session;
use quiesce_core::{LockDuration, LockMode, LockRequest, ObjectName, QuiesceError, Result};

impl BackupCoordinator {
    /// Pin `object`, replacing any object this session pinned before.
    pub fn backup_lock(&self, session: &mut Session, object: &ObjectName) -> Result<()> {
        self.backup_unlock(session);

        if session.locked_tables() || session.in_transaction() {
            return Err(QuiesceError::ConflictingSession(
                "BACKUP LOCK is not allowed under LOCK TABLES or in a transaction".into(),
            ));
        }

        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);
        let ticket = self.locks.acquire(
            &LockRequest::object(object.clone(), LockMode::SharedHighPrio, LockDuration::Explicit),
            &waiter,
        )?;
        session.backup_lock = Some(ticket);
        tracing::debug!("{}: BACKUP LOCK {}", session.id(), object);
        Ok(())
    }

    /// Drop the pin, if any.
    pub fn backup_unlock(&self, session: &mut Session) {
        if let Some(ticket) = session.backup_lock.take() {
            self.locks.release(ticket);
            tracing::debug!("{}: BACKUP UNLOCK", session.id());
        }
    }
}

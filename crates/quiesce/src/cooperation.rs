//! Letting a long ALTER TABLE run alongside BLOCK_DDL
//!
//! A copying ALTER spends most of its time copying rows, which is harmless to
//! a backup at BLOCK_DDL. During the copy it drops its backup namespace lock
//! from `Ddl` to `AlterCopy`, which BLOCK_DDL does not wait for, and takes
//! `Ddl` back before it swaps the tables.

use crate::coordinator::BackupCoordinator;
use crate::protection::StatementClass;
use crate::session::Session;
use quiesce_core::{LockMode, ObjectName, Result, TicketId};

impl BackupCoordinator {
    /// Lower the running DDL statement's lock for the copy phase of an
    /// ALTER on `object`.
    ///
    /// No-op when the statement holds no backup namespace lock (temporary
    /// tables, LOCK TABLES).
    pub fn downgrade_for_copy(&self, session: &Session, object: &ObjectName) {
        let Some(ticket) = ddl_ticket(session) else {
            return;
        };
        tracing::debug!("{}: copy phase of ALTER on {}", session.id(), object);
        self.locks.downgrade(ticket, LockMode::AlterCopy);
    }

    /// Take `Ddl` back after the copy.
    ///
    /// Waits while a backup is at BLOCK_DDL or later. An error means the
    /// ALTER must be aborted.
    pub fn reupgrade_after_copy(&self, session: &Session) -> Result<()> {
        let Some(ticket) = ddl_ticket(session) else {
            return Ok(());
        };
        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);
        self.locks.upgrade(ticket, LockMode::Ddl, &waiter)
    }
}

fn ddl_ticket(session: &Session) -> Option<TicketId> {
    match session.statement_class {
        Some(StatementClass::Ddl) => session.statement_ticket,
        _ => None,
    }
}

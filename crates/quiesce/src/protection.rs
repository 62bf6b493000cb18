//! Locks ordinary statements take so the backup levels can hold them off
//!
//! Every write statement holds a lock in the backup namespace for as long as
//! it runs, chosen by what it writes. The escalation levels are defined in
//! terms of these locks: `BACKUP_FLUSH` refuses new `Dml`, `BACKUP_BLOCK_DDL`
//! refuses new `Ddl`, and so on.

use crate::coordinator::BackupCoordinator;
use crate::session::Session;
use quiesce_core::{LockDuration, LockMode, LockRequest, ObjectName, QuiesceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a statement writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementClass {
    /// DML on a table of a non-transactional engine
    NonTransactionalWrite,
    /// DML on a table of a transactional engine
    TransactionalWrite,
    /// Write to a log or statistics table
    SystemTableWrite,
    Ddl,
}

impl StatementClass {
    /// Backup namespace lock held while the statement runs.
    pub fn backup_lock_mode(self) -> LockMode {
        match self {
            StatementClass::NonTransactionalWrite => LockMode::Dml,
            StatementClass::TransactionalWrite => LockMode::TransDml,
            StatementClass::SystemTableWrite => LockMode::SysDml,
            StatementClass::Ddl => LockMode::Ddl,
        }
    }

    /// Lock taken on each table the statement touches.
    pub fn object_lock_mode(self) -> LockMode {
        match self {
            StatementClass::Ddl => LockMode::Exclusive,
            _ => LockMode::Shared,
        }
    }
}

impl fmt::Display for StatementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementClass::NonTransactionalWrite => "non_transactional_write",
            StatementClass::TransactionalWrite => "transactional_write",
            StatementClass::SystemTableWrite => "system_table_write",
            StatementClass::Ddl => "ddl",
        };
        f.write_str(name)
    }
}

impl FromStr for StatementClass {
    type Err = QuiesceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "non_transactional_write" | "write" => Ok(StatementClass::NonTransactionalWrite),
            "transactional_write" | "trans_write" => Ok(StatementClass::TransactionalWrite),
            "system_table_write" | "sys_write" => Ok(StatementClass::SystemTableWrite),
            "ddl" => Ok(StatementClass::Ddl),
            other => Err(QuiesceError::Parse(format!("unknown statement class '{}'", other))),
        }
    }
}

impl BackupCoordinator {
    /// Take the locks a statement of `class` on `objects` needs.
    ///
    /// Blocks while the running backup's level refuses this class. On
    /// failure nothing is left held.
    pub fn begin_statement(
        &self,
        session: &mut Session,
        class: StatementClass,
        objects: &[ObjectName],
    ) -> Result<()> {
        if session.statement_ticket.is_some() {
            return Err(QuiesceError::InvalidState(format!(
                "{} already has a statement running",
                session.id()
            )));
        }

        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);
        let ticket = self.locks.acquire(
            &LockRequest::backup(class.backup_lock_mode(), LockDuration::Statement),
            &waiter,
        )?;
        session.statement_ticket = Some(ticket);
        session.statement_class = Some(class);

        for object in objects {
            let request =
                LockRequest::object(object.clone(), class.object_lock_mode(), LockDuration::Statement);
            match self.locks.acquire(&request, &waiter) {
                Ok(ticket) => session.object_tickets.push(ticket),
                Err(e) => {
                    self.end_statement(session);
                    return Err(e);
                }
            }
        }
        tracing::trace!("{}: began {} statement", session.id(), class);
        Ok(())
    }

    /// Release the running statement's locks. No-op when none are held.
    pub fn end_statement(&self, session: &mut Session) {
        for ticket in session.object_tickets.drain(..) {
            self.locks.release(ticket);
        }
        if let Some(ticket) = session.statement_ticket.take() {
            self.locks.release(ticket);
        }
        session.statement_class = None;
    }

    /// Commit the session's transaction.
    ///
    /// Holds `Commit` in the backup namespace for the duration of the
    /// commit, so it waits while a backup is at BLOCK_COMMIT.
    pub fn commit(&self, session: &mut Session) -> Result<()> {
        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);
        let ticket = self.locks.acquire(
            &LockRequest::backup(LockMode::Commit, LockDuration::Transaction),
            &waiter,
        )?;
        self.locks.release(ticket);
        session.set_in_transaction(false);
        Ok(())
    }
}

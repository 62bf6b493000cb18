//! The five stage handlers
//!
//! Each handler tightens (or, for END, drops) the escalation ticket and calls
//! the collaborators. Handlers only clean up what they acquired themselves;
//! putting the session back to its previous stage is the controller's job.

use crate::coordinator::BackupCoordinator;
use crate::retry::upgrade_with_retry;
use crate::session::Session;
use quiesce_core::{
    observe, BackupStage, FlushScope, LockDuration, LockMode, LockRequest, QuiesceError, Result,
    StorageEngine, TicketId,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

impl BackupCoordinator {
    pub(crate) fn stage_start(&self, session: &mut Session) -> Result<()> {
        if session.locked_tables() || session.holds_global_read_lock() {
            return Err(QuiesceError::ConflictingSession(
                "BACKUP STAGE START is not allowed under LOCK TABLES or a global read lock".into(),
            ));
        }

        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);
        let ticket = self.locks.acquire(
            &LockRequest::backup(LockMode::BackupStart, LockDuration::Explicit),
            &waiter,
        )?;
        if let Err(e) = self.install_ticket(session.id(), ticket) {
            self.locks.release(ticket);
            return Err(e);
        }

        if let Err(e) = self.ddl_log.open(&self.config.ddl_log_path) {
            tracing::error!(
                "Failed to open DDL log {}: {}",
                self.config.ddl_log_path.display(),
                e
            );
            self.abort_start(session, ticket, &[]);
            return Err(e);
        }

        self.locks.downgrade(ticket, LockMode::BackupRunning);
        self.flush_failures.store(0, Ordering::Relaxed);

        let mut prepared: Vec<&Arc<dyn StorageEngine>> = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            if let Err(e) = engine.prepare_for_backup() {
                tracing::error!("Engine {} failed to prepare for backup: {}", engine.name(), e);
                self.abort_start(session, ticket, &prepared);
                return Err(e);
            }
            prepared.push(engine);
        }

        observe::set_backup_active(true);
        Ok(())
    }

    /// Undo a partly done START.
    fn abort_start(&self, session: &Session, ticket: TicketId, prepared: &[&Arc<dyn StorageEngine>]) {
        for engine in prepared.iter().rev() {
            if let Err(e) = engine.end_backup() {
                tracing::warn!("Engine {} failed to end backup: {}", engine.name(), e);
            }
        }
        self.ddl_log.close();
        self.take_ticket(session.id());
        self.locks.release(ticket);
    }

    pub(crate) fn stage_flush(&self, session: &mut Session) -> Result<()> {
        let ticket = self.ticket_of(session.id())?;
        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);

        // Blocks new writes to non-transactional tables; running ones finish.
        self.locks.upgrade(ticket, LockMode::BackupFlush, &waiter)?;
        self.tables.purge_unused();
        Ok(())
    }

    pub(crate) fn stage_block_ddl(&self, session: &mut Session) -> Result<()> {
        let ticket = self.ticket_of(session.id())?;

        // Both hold locks the escalation would otherwise wait on forever.
        if let Err(e) = self.tables.stop_delayed_inserts() {
            tracing::warn!("Ignoring failure to stop delayed inserts: {}", e);
            observe::record_ignored_failure("stop_delayed_inserts");
        }
        if let Err(e) = self.tables.close_handler_tables(session.id()) {
            tracing::warn!("Ignoring failure to close handler tables: {}", e);
            observe::record_ignored_failure("close_handler_tables");
        }

        let mut desynced = false;
        let result = self.escalate_to_block_ddl(session, ticket, &mut desynced);
        if result.is_err() {
            self.locks.downgrade(ticket, LockMode::BackupFlush);
            if desynced {
                session.caused_desync = false;
                if let Err(e) = self.replication.resume_and_resync() {
                    tracing::error!("Failed to resync replication after BLOCK_DDL failed: {}", e);
                    observe::record_ignored_failure("resume_and_resync");
                }
            }
        }
        result
    }

    fn escalate_to_block_ddl(
        &self,
        session: &mut Session,
        ticket: TicketId,
        desynced: &mut bool,
    ) -> Result<()> {
        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);

        self.locks.upgrade(ticket, LockMode::BackupWaitFlush, &waiter)?;
        self.best_effort_flush(FlushScope::NonTransactional)?;

        if self.config.replication_desync && self.replication.is_active() {
            self.replication.desync_and_pause()?;
            session.caused_desync = true;
            *desynced = true;
            tracing::info!("{}: desynced from replication", session.id());
        }

        upgrade_with_retry(
            self.locks.as_ref(),
            ticket,
            LockMode::BackupBlockDdl,
            &waiter,
            &self.config.block_ddl_retry,
            self.config.kill_poll_interval(),
        )
    }

    pub(crate) fn stage_block_commit(&self, session: &mut Session) -> Result<()> {
        let ticket = self.ticket_of(session.id())?;
        let kill = session.kill_flag();
        let waiter = self.waiter(session.id(), &kill);

        self.locks.upgrade(ticket, LockMode::BackupBlockCommit, &waiter)?;
        self.best_effort_flush(FlushScope::LogAndStatistics)?;

        if self.binlog.is_open() {
            self.binlog.flush_and_sync()?;
        }
        Ok(())
    }

    /// Finish the session's backup and release everything it holds.
    ///
    /// Safe to call in any state, any number of times. Collaborator failures
    /// are logged and teardown continues, so this always returns `Ok`.
    pub fn backup_end(&self, session: &mut Session) -> Result<()> {
        self.teardown_backup(session);
        Ok(())
    }

    pub(crate) fn teardown_backup(&self, session: &mut Session) {
        if session.backup_stage == BackupStage::Finished {
            return;
        }

        for engine in &self.engines {
            if let Err(e) = engine.end_backup() {
                tracing::error!("Engine {} failed to end backup: {}", engine.name(), e);
                observe::record_ignored_failure("end_backup");
            }
        }

        self.ddl_log.close();
        if let Some(active) = self.take_ticket(session.id()) {
            self.locks.release(active.ticket);
        }
        self.set_stage(session, BackupStage::Finished);
        observe::set_backup_active(false);

        if session.caused_desync {
            session.caused_desync = false;
            if let Err(e) = self.replication.resume_and_resync() {
                tracing::error!("Failed to resync replication: {}", e);
                observe::record_ignored_failure("resume_and_resync");
            } else if let Err(e) = self.replication.wait_for_flow_control() {
                tracing::error!("Failed waiting for replication flow control: {}", e);
                observe::record_ignored_failure("wait_for_flow_control");
            }
        }
    }

    /// Flush tables, tolerating failures as far as the configured policy
    /// allows.
    fn best_effort_flush(&self, scope: FlushScope) -> Result<()> {
        let Err(e) = self.tables.flush_tables(scope) else {
            return Ok(());
        };
        let failures = self.flush_failures.fetch_add(1, Ordering::Relaxed) + 1;
        observe::record_ignored_failure("flush_tables");
        if self.config.flush_failure_policy.tolerates(failures) {
            tracing::warn!("Ignoring {:?} flush failure ({} so far): {}", scope, failures, e);
            Ok(())
        } else {
            tracing::error!("{:?} flush failed ({} failures): {}", scope, failures, e);
            Err(e)
        }
    }
}

//! `BACKUP STAGE` request validation and the forward walk over handlers

use crate::coordinator::BackupCoordinator;
use crate::session::Session;
use quiesce_core::{observe, BackupStage, QuiesceError, Result};
use std::time::Instant;

impl BackupCoordinator {
    /// Move `session`'s backup forward to `requested`.
    ///
    /// Stages skipped over are run in order, so `START` followed directly
    /// by `BLOCK_COMMIT` also runs `FLUSH` and `BLOCK_DDL`. `END` is always
    /// run directly. If any handler fails, the session returns to the stage
    /// it was at before the call (or `Finished` when `START` failed), the
    /// escalation ticket drops back to that stage's level, and the error
    /// names `requested`.
    pub fn run_stage(&self, session: &mut Session, requested: BackupStage) -> Result<()> {
        let current = session.backup_stage;
        if requested == BackupStage::Finished {
            return Err(QuiesceError::InvalidState(
                "FINISHED is not a stage that can be requested".into(),
            ));
        }
        if current == BackupStage::Finished {
            if requested != BackupStage::Start {
                return Err(QuiesceError::NotRunning(requested));
            }
        } else if requested <= current {
            return Err(QuiesceError::WrongStageOrder { requested, current });
        }

        tracing::info!("{}: BACKUP STAGE {} (from {})", session.id(), requested, current);
        let started = Instant::now();

        let result = if requested == BackupStage::End {
            self.backup_end(session)
        } else {
            self.walk_stages(session, current, requested)
        };

        observe::record_stage(requested, started.elapsed(), result.is_ok());
        match &result {
            Ok(()) => tracing::info!(
                "{}: BACKUP STAGE {} done in {:?}",
                session.id(),
                requested,
                started.elapsed()
            ),
            Err(e) => tracing::warn!("{}: {}", session.id(), e),
        }
        result
    }

    fn walk_stages(
        &self,
        session: &mut Session,
        from: BackupStage,
        to: BackupStage,
    ) -> Result<()> {
        let mut stage = from;
        while stage != to {
            let next = stage.next();
            let outcome = match next {
                BackupStage::Start => self.stage_start(session),
                BackupStage::Flush => self.stage_flush(session),
                BackupStage::BlockDdl => self.stage_block_ddl(session),
                BackupStage::BlockCommit => self.stage_block_commit(session),
                BackupStage::End | BackupStage::Finished => Err(QuiesceError::InvalidState(
                    format!("{} is not reached by walking forward", next),
                )),
            };

            match outcome {
                Ok(()) => {
                    tracing::debug!("{}: completed stage {}", session.id(), next);
                    self.set_stage(session, next);
                    stage = next;
                }
                Err(source) => {
                    self.revert_to(session, from);
                    return Err(QuiesceError::stage_failed(to, source));
                }
            }
        }
        Ok(())
    }

    /// Put the session and the ticket back at `stage`.
    fn revert_to(&self, session: &mut Session, stage: BackupStage) {
        if let Some(level) = stage.held_level() {
            if let Ok(ticket) = self.ticket_of(session.id()) {
                self.locks.downgrade(ticket, level);
            }
        }
        self.set_stage(session, stage);
        tracing::debug!("{}: reverted to stage {}", session.id(), stage);
    }
}

//! Quiesce: staged backup quiescence for a live multi-table database
//!
//! Brings a server that keeps serving statements to a sequence of
//! increasingly restrictive states so an external tool can copy its files:
//! - **BACKUP STAGE START**: one backup at a time, DDL audit log opened
//! - **FLUSH**: new writes to non-transactional tables wait
//! - **BLOCK_DDL**: running DDL drained, new DDL waits (deadlocks retried)
//! - **BLOCK_COMMIT**: commits wait, binary log synced
//! - **END**: everything released, replication resynced
//!
//! Plus `BACKUP LOCK` to pin a single table, and the hooks a copying ALTER
//! uses to keep running while DDL is blocked.
//!
//! # Quick Start
//!
//! ```no_run
//! use quiesce::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let coordinator = BackupCoordinator::builder(BackupConfig::new("./data")).build()?;
//! let mut backup = coordinator.new_session();
//!
//! BackupStatement::parse("BACKUP STAGE START")?.execute(&coordinator, &mut backup)?;
//! BackupStatement::parse("BACKUP STAGE BLOCK_COMMIT")?.execute(&coordinator, &mut backup)?;
//! // copy files
//! BackupStatement::parse("BACKUP STAGE END")?.execute(&coordinator, &mut backup)?;
//! # Ok(())
//! # }
//! ```

mod controller;
mod cooperation;
pub mod coordinator;
mod handlers;
mod object_lock;
pub mod prelude;
pub mod protection;
mod retry;
pub mod session;
pub mod statement;

// Re-export core types
pub use quiesce_core::{
    config::{BackupConfig, FlushFailurePolicy, RetryConfig},
    error::{QuiesceError, Result},
    traits::{
        BinaryLog, FlushScope, MetadataLocks, NoBinaryLog, NoReplication, NullTableCache,
        ReplicationCoordinator, StorageEngine, TableCache,
    },
    types::{
        BackupStage, DdlLogRecord, DdlObjectInfo, GrantedLock, KillFlag, LockDuration, LockKey,
        LockMode, LockRequest, LockWaiter, ObjectName, SessionId, TicketId,
    },
    LockManager,
};

pub use quiesce_ddl_log::{DdlLog, DdlLogLine};

// Re-export main types from this crate
pub use coordinator::{BackupCoordinator, BackupCoordinatorBuilder, BackupStatus};
pub use protection::StatementClass;
pub use session::Session;
pub use statement::BackupStatement;

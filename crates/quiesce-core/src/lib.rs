//! Quiesce Core: types, lock service and collaborator traits for staged
//! backup quiescence
//!
//! This crate defines the pieces the backup protocol is built from:
//! - Backup stages and the lock levels each stage holds
//! - `MetadataLocks`: the lock service the protocol escalates through, with
//!   an in-process `LockManager` (timeouts, kill observation, deadlock
//!   detection)
//! - Collaborator traits for storage engines, the table cache, replication
//!   and the binary log, each with a no-op implementation
//! - `BackupConfig`: retry schedule, timeouts and flush failure policy

pub mod config;
pub mod error;
pub mod lock_manager;
pub mod observe;
pub mod traits;
pub mod types;
pub mod wait_graph;

pub use config::{BackupConfig, FlushFailurePolicy, RetryConfig};
pub use error::{QuiesceError, Result};
pub use lock_manager::LockManager;
pub use traits::{
    BinaryLog, FlushScope, MetadataLocks, NoBinaryLog, NoReplication, NullTableCache,
    ReplicationCoordinator, StorageEngine, TableCache,
};
pub use types::{
    BackupStage, DdlLogRecord, DdlObjectInfo, GrantedLock, KillFlag, LockDuration, LockKey,
    LockMode, LockRequest, LockWaiter, ObjectName, SessionId, TicketId,
};
pub use wait_graph::WaitForGraph;

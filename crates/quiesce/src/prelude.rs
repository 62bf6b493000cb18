//! Quiesce Prelude
//!
//! ```
//! use quiesce::prelude::*;
//! ```

// Core types
pub use crate::{BackupStage, ObjectName, QuiesceError, Result, SessionId};

// Configs
pub use crate::{BackupConfig, FlushFailurePolicy, RetryConfig};

// Coordinator and sessions
pub use crate::{BackupCoordinator, BackupStatement, BackupStatus, Session, StatementClass};

// Collaborator traits
pub use crate::{BinaryLog, FlushScope, MetadataLocks, ReplicationCoordinator, StorageEngine, TableCache};

// DDL audit log
pub use crate::{DdlLogLine, DdlLogRecord, DdlObjectInfo};

// Re-export common external deps
pub use anyhow;
pub use std::sync::Arc;
pub use tracing;

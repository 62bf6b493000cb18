pub mod binlog;
pub mod engine;
pub mod locks;
pub mod replication;
pub mod tables;

pub use binlog::{BinaryLog, NoBinaryLog};
pub use engine::StorageEngine;
pub use locks::MetadataLocks;
pub use replication::{NoReplication, ReplicationCoordinator};
pub use tables::{FlushScope, NullTableCache, TableCache};

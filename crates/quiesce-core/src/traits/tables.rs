use crate::error::Result;
use crate::types::SessionId;

/// Which tables a best-effort flush should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushScope {
    /// Tables of non-transactional engines (flushed before BLOCK_DDL).
    NonTransactional,
    /// Log and statistics tables (flushed during BLOCK_COMMIT).
    LogAndStatistics,
}

/// Table definition and open-table caches, plus the helper threads that
/// write through them.
pub trait TableCache: Send + Sync {
    /// Release every unused table share and handle. Tables in use are left
    /// alone.
    fn purge_unused(&self);

    /// Flush dirty data of the given tables to disk.
    fn flush_tables(&self, scope: FlushScope) -> Result<()>;

    /// Stop background deferred-insert workers so they release their locks.
    fn stop_delayed_inserts(&self) -> Result<()>;

    /// Close handler-style table openings owned by a session.
    fn close_handler_tables(&self, session: SessionId) -> Result<()>;
}

/// Table cache for deployments that have nothing to purge or flush.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTableCache;

impl TableCache for NullTableCache {
    fn purge_unused(&self) {}

    fn flush_tables(&self, _scope: FlushScope) -> Result<()> {
        Ok(())
    }

    fn stop_delayed_inserts(&self) -> Result<()> {
        Ok(())
    }

    fn close_handler_tables(&self, _session: SessionId) -> Result<()> {
        Ok(())
    }
}

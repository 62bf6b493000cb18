use crate::error::Result;

/// The server's binary (replication) log.
pub trait BinaryLog: Send + Sync {
    fn is_open(&self) -> bool;

    /// Flush and fsync the current log file, under the log's own lock.
    fn flush_and_sync(&self) -> Result<()>;
}

/// Binary log for servers running without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBinaryLog;

impl BinaryLog for NoBinaryLog {
    fn is_open(&self) -> bool {
        false
    }

    fn flush_and_sync(&self) -> Result<()> {
        Ok(())
    }
}

use crate::error::Result;

/// Synchronous replication layer.
///
/// While a backup holds BLOCK_DDL and BLOCK_COMMIT, a node taking part in
/// synchronous replication would stall the whole cluster. The coordinator
/// therefore desyncs the node first and resyncs it at END.
pub trait ReplicationCoordinator: Send + Sync {
    /// Whether this node currently takes part in replication.
    fn is_active(&self) -> bool;

    /// Leave synchronous replication and pause applying.
    fn desync_and_pause(&self) -> Result<()>;

    /// Resume applying and rejoin synchronous replication.
    fn resume_and_resync(&self) -> Result<()>;

    /// Block until flow control allows this node to proceed.
    fn wait_for_flow_control(&self) -> Result<()>;
}

/// Replication layer for standalone servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReplication;

impl ReplicationCoordinator for NoReplication {
    fn is_active(&self) -> bool {
        false
    }

    fn desync_and_pause(&self) -> Result<()> {
        Ok(())
    }

    fn resume_and_resync(&self) -> Result<()> {
        Ok(())
    }

    fn wait_for_flow_control(&self) -> Result<()> {
        Ok(())
    }
}

use crate::error::Result;

/// Storage engine hooks called at the edges of a backup.
pub trait StorageEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Called from BACKUP STAGE START, after the backup lock is held.
    ///
    /// Engines use it to pin redo logs or start change tracking. A failure
    /// aborts the START stage.
    fn prepare_for_backup(&self) -> Result<()>;

    /// Called from BACKUP STAGE END and when a failed START unwinds.
    fn end_backup(&self) -> Result<()>;
}

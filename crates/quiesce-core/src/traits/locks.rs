use crate::error::Result;
use crate::types::{GrantedLock, LockKey, LockMode, LockRequest, LockWaiter, TicketId};

/// Metadata lock service.
///
/// The backup protocol only ever talks to locks through this trait, so a
/// server can plug in its own lock manager. Waiting calls must honour the
/// waiter's timeout and kill flag, and must report a wait-for cycle as
/// [`QuiesceError::Deadlock`](crate::QuiesceError::Deadlock) rather than
/// waiting out the timeout.
pub trait MetadataLocks: Send + Sync {
    /// Acquire a new lock, waiting for conflicting grants to go away.
    fn acquire(&self, request: &LockRequest, waiter: &LockWaiter<'_>) -> Result<TicketId>;

    /// Raise a granted lock to a stronger level of the same family.
    ///
    /// Upgrading to a level the ticket already covers is a no-op. On failure
    /// the ticket keeps its previous level.
    fn upgrade(&self, ticket: TicketId, mode: LockMode, waiter: &LockWaiter<'_>) -> Result<()>;

    /// Lower a granted lock. Never blocks; requests for a stronger level are
    /// ignored.
    fn downgrade(&self, ticket: TicketId, mode: LockMode);

    /// Release a lock. Unknown tickets are ignored.
    fn release(&self, ticket: TicketId);

    /// Current level of a ticket, or `None` if it is not granted.
    fn mode_of(&self, ticket: TicketId) -> Option<LockMode>;

    /// Snapshot of every lock granted on `key`.
    fn granted(&self, key: &LockKey) -> Vec<GrantedLock>;
}

pub mod ddl;
pub mod lock;
pub mod object;
pub mod session;
pub mod stage;

pub use ddl::{DdlLogRecord, DdlObjectInfo};
pub use lock::{
    GrantedLock, LockDuration, LockKey, LockMode, LockRequest, LockWaiter, TicketId,
};
pub use object::ObjectName;
pub use session::{KillFlag, SessionId};
pub use stage::BackupStage;

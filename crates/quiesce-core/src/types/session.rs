use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier of a client session (connection).
///
/// Doubles as the owner id in the lock service: tickets held by the same
/// session never conflict with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Kill request shared between a session and whoever may cancel it.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct KillFlag(Arc<AtomicBool>);

impl KillFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a kill request once the session has reported it.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

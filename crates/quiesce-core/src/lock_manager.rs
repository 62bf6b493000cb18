//! In-process metadata lock manager
//!
//! Grants [`LockMode`] levels on [`LockKey`]s according to the asymmetric
//! compatibility relation in [`LockMode::conflicts_with`].
//!
//! # Waiting
//!
//! A request that conflicts with locks granted to *other* sessions waits on a
//! condition variable. Every wake-up (a release or downgrade, or the kill
//! poll interval elapsing) re-evaluates the conflict set, so waits end as
//! soon as the blocking locks are gone. Three things end a wait early:
//!
//! 1. **Timeout**: the waiter's timeout elapsed, `LockTimeout` is returned.
//! 2. **Kill**: the waiter's [`KillFlag`](crate::KillFlag) was tripped,
//!    `Killed` is returned.
//! 3. **Deadlock**: the waiter's wait-for edges close a cycle. The waiter
//!    that closes the cycle is the victim and gets `Deadlock`; the other
//!    sessions on the cycle keep waiting.
//!
//! A backup level that is still waiting also holds off new statement locks
//! it would conflict with once granted. Without that, a stream of short
//! statements could keep BLOCK_DDL or BLOCK_COMMIT waiting indefinitely.
//!
//! # Example
//!
//! ```ignore
//! let lm = LockManager::new(Duration::from_millis(10));
//! let kill = KillFlag::new();
//! let waiter = LockWaiter { owner: SessionId(1), kill: &kill, timeout: Duration::from_secs(5) };
//!
//! let ticket = lm.acquire(&LockRequest::backup(LockMode::BackupStart, LockDuration::Explicit), &waiter)?;
//! lm.downgrade(ticket, LockMode::BackupRunning);
//! lm.upgrade(ticket, LockMode::BackupFlush, &waiter)?;
//! lm.release(ticket);
//! ```

use crate::error::{QuiesceError, Result};
use crate::observe;
use crate::traits::MetadataLocks;
use crate::types::{
    GrantedLock, LockDuration, LockKey, LockMode, LockRequest, LockWaiter, SessionId, TicketId,
};
use crate::wait_graph::WaitForGraph;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default interval at which blocked waits re-check their kill flag
pub const DEFAULT_KILL_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone)]
struct TicketState {
    key: LockKey,
    owner: SessionId,
    mode: LockMode,
    duration: LockDuration,
}

#[derive(Debug, Default)]
struct LockTable {
    tickets: HashMap<TicketId, TicketState>,
    next_ticket: u64,
    waits: WaitForGraph,
    /// Requests currently blocked, one per session.
    pending: HashMap<SessionId, (LockKey, LockMode)>,
}

impl LockTable {
    /// Sessions other than `requester` that keep `mode` on `key` waiting:
    /// owners of conflicting grants, plus sessions waiting for a backup level
    /// that a new statement lock would hold up.
    fn blockers(&self, key: &LockKey, mode: LockMode, requester: SessionId) -> Vec<SessionId> {
        let granted = self
            .tickets
            .values()
            .filter(|t| t.owner != requester && &t.key == key && mode.conflicts_with(t.mode))
            .map(|t| t.owner);
        let pending = self
            .pending
            .iter()
            .filter(|(owner, (pending_key, pending_mode))| {
                **owner != requester
                    && pending_key == key
                    && mode.is_statement_level()
                    && pending_mode.is_backup_level()
                    && mode.conflicts_with(*pending_mode)
            })
            .map(|(owner, _)| *owner);
        let mut owners: Vec<SessionId> = granted.chain(pending).collect();
        owners.sort_unstable();
        owners.dedup();
        owners
    }

    fn ticket(&self, ticket: TicketId) -> Result<&TicketState> {
        self.tickets
            .get(&ticket)
            .ok_or_else(|| QuiesceError::InvalidState(format!("{} is not granted", ticket)))
    }
}

/// Metadata lock manager with deadlock detection
pub struct LockManager {
    table: Mutex<LockTable>,
    changed: Condvar,
    poll_interval: Duration,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_KILL_POLL_INTERVAL_MS))
    }
}

impl LockManager {
    /// Create a lock manager
    ///
    /// # Arguments
    ///
    /// * `poll_interval` - Upper bound on how long a blocked wait sleeps
    ///   before re-checking its kill flag.
    ///
    /// # Panics
    ///
    /// Panics if `poll_interval` is zero.
    pub fn new(poll_interval: Duration) -> Self {
        assert!(!poll_interval.is_zero(), "poll_interval must be positive");
        Self {
            table: Mutex::new(LockTable::default()),
            changed: Condvar::new(),
            poll_interval,
        }
    }

    /// Number of tickets currently granted, across all keys
    pub fn granted_count(&self) -> usize {
        self.table.lock().tickets.len()
    }

    /// Whether `session` is currently blocked in a lock wait
    pub fn is_waiting(&self, session: SessionId) -> bool {
        self.table.lock().waits.is_waiting(session)
    }

    /// Block until `mode` on `key` is compatible with every lock granted to
    /// other sessions.
    fn wait_for_grant(
        &self,
        table: &mut MutexGuard<'_, LockTable>,
        key: &LockKey,
        mode: LockMode,
        waiter: &LockWaiter<'_>,
    ) -> Result<()> {
        let started = Instant::now();
        let deadline = started.checked_add(waiter.timeout);
        let mut waited = false;

        let outcome = loop {
            let blockers = table.blockers(key, mode, waiter.owner);
            if blockers.is_empty() {
                break Ok(());
            }
            if waiter.kill.is_killed() {
                break Err(QuiesceError::Killed);
            }

            table.waits.set_waits(waiter.owner, blockers.iter().copied());
            if let Some(cycle) = table.waits.cycle_through(waiter.owner) {
                tracing::debug!(
                    "Deadlock on {} requesting {} by {}: cycle {:?}",
                    key,
                    mode,
                    waiter.owner,
                    cycle
                );
                break Err(QuiesceError::Deadlock);
            }

            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    break Err(QuiesceError::LockTimeout {
                        timeout_ms: waiter.timeout.as_millis() as u64,
                    });
                }
                Some(deadline) => deadline - now,
                None => self.poll_interval,
            };

            if !waited {
                table
                    .pending
                    .insert(waiter.owner, (key.clone(), mode));
                tracing::debug!(
                    "{} waiting for {} on {} (blocked by {:?})",
                    waiter.owner,
                    mode,
                    key,
                    blockers
                );
                waited = true;
            }
            self.changed
                .wait_for(table, remaining.min(self.poll_interval));
        };

        table.waits.clear_waiter(waiter.owner);
        if waited {
            table.pending.remove(&waiter.owner);
            // Statements held up by this request may proceed now.
            self.changed.notify_all();
            observe::record_lock_wait(started.elapsed());
        }
        outcome
    }
}

impl MetadataLocks for LockManager {
    fn acquire(&self, request: &LockRequest, waiter: &LockWaiter<'_>) -> Result<TicketId> {
        if !request.key.accepts(request.mode) {
            return Err(QuiesceError::InvalidState(format!(
                "{} cannot be requested on {}",
                request.mode, request.key
            )));
        }

        let mut table = self.table.lock();
        self.wait_for_grant(&mut table, &request.key, request.mode, waiter)?;

        table.next_ticket += 1;
        let ticket = TicketId(table.next_ticket);
        table.tickets.insert(
            ticket,
            TicketState {
                key: request.key.clone(),
                owner: waiter.owner,
                mode: request.mode,
                duration: request.duration,
            },
        );
        tracing::trace!(
            "Granted {} {} on {} to {}",
            ticket,
            request.mode,
            request.key,
            waiter.owner
        );
        Ok(ticket)
    }

    fn upgrade(&self, ticket: TicketId, mode: LockMode, waiter: &LockWaiter<'_>) -> Result<()> {
        let mut table = self.table.lock();
        let state = table.ticket(ticket)?;
        if !state.mode.same_family(mode) {
            return Err(QuiesceError::InvalidState(format!(
                "cannot upgrade {} from {} to {}",
                ticket, state.mode, mode
            )));
        }
        if state.mode.rank() >= mode.rank() {
            return Ok(());
        }
        let key = state.key.clone();

        self.wait_for_grant(&mut table, &key, mode, waiter)?;

        // The table lock was released while waiting, so the ticket may be gone.
        let state = table
            .tickets
            .get_mut(&ticket)
            .ok_or_else(|| QuiesceError::InvalidState(format!("{} released while upgrading", ticket)))?;
        tracing::trace!("Upgraded {} from {} to {}", ticket, state.mode, mode);
        state.mode = mode;
        Ok(())
    }

    fn downgrade(&self, ticket: TicketId, mode: LockMode) {
        let mut table = self.table.lock();
        let Some(state) = table.tickets.get_mut(&ticket) else {
            return;
        };
        if !state.mode.same_family(mode) || state.mode.rank() <= mode.rank() {
            return;
        }
        tracing::trace!("Downgraded {} from {} to {}", ticket, state.mode, mode);
        state.mode = mode;
        drop(table);
        self.changed.notify_all();
    }

    fn release(&self, ticket: TicketId) {
        let removed = self.table.lock().tickets.remove(&ticket);
        if let Some(state) = removed {
            tracing::trace!("Released {} {} on {}", ticket, state.mode, state.key);
            self.changed.notify_all();
        }
    }

    fn mode_of(&self, ticket: TicketId) -> Option<LockMode> {
        self.table.lock().tickets.get(&ticket).map(|t| t.mode)
    }

    fn granted(&self, key: &LockKey) -> Vec<GrantedLock> {
        let table = self.table.lock();
        let mut locks: Vec<GrantedLock> = table
            .tickets
            .iter()
            .filter(|(_, t)| &t.key == key)
            .map(|(id, t)| GrantedLock {
                ticket: *id,
                owner: t.owner,
                mode: t.mode,
                duration: t.duration,
            })
            .collect();
        locks.sort_by_key(|l| l.ticket);
        locks
    }
}

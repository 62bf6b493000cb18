//! Deadlock retry for lock upgrades

use quiesce_core::{
    observe, KillFlag, LockMode, LockWaiter, MetadataLocks, QuiesceError, Result, RetryConfig,
    TicketId,
};
use std::time::{Duration, Instant};

/// Upgrade `ticket` to `mode`, retrying deadlocks on the `retry` schedule.
///
/// Only [`QuiesceError::Deadlock`] is retried; a timeout or kill is returned
/// at once. A killed session stops retrying, including during the sleep.
pub(crate) fn upgrade_with_retry(
    locks: &dyn MetadataLocks,
    ticket: TicketId,
    mode: LockMode,
    waiter: &LockWaiter<'_>,
    retry: &RetryConfig,
    poll_interval: Duration,
) -> Result<()> {
    let mut retries = 0;
    loop {
        match locks.upgrade(ticket, mode, waiter) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_deadlock() && retries < retry.max_retries && !waiter.kill.is_killed() => {
                let delay = retry.backoff(retries);
                retries += 1;
                tracing::debug!(
                    "{}: deadlock upgrading to {}, retry {}/{} in {:?}",
                    waiter.owner,
                    mode,
                    retries,
                    retry.max_retries,
                    delay
                );
                observe::record_block_ddl_retry();
                if !sleep_unless_killed(delay, waiter.kill, poll_interval) {
                    return Err(QuiesceError::Killed);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sleep for `delay`, waking every `poll` to check `kill`. Returns false if
/// the session was killed.
fn sleep_unless_killed(delay: Duration, kill: &KillFlag, poll: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if kill.is_killed() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(poll));
    }
}

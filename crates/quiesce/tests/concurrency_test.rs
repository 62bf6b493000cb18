//! Cross-session behaviour of the escalation levels
//!
//! Key invariants tested:
//! 1. Only one session can be between START and END
//! 2. FLUSH holds off new non-transactional writes but not running ones
//! 3. BLOCK_DDL drains running DDL and holds off new DDL until END
//! 4. BLOCK_COMMIT holds off commits until END
//! 4a. While an escalation waits, new statements it blocks queue behind it
//! 5. Killed waits return promptly
//! 6. A real wait-for cycle is reported as a deadlock and retried

mod common;

use common::{wait_until, TestEnv};
use quiesce::prelude::*;
use quiesce::{
    KillFlag, LockDuration, LockManager, LockMode, LockRequest, LockWaiter, QuiesceError, TicketId,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn table(name: &str) -> ObjectName {
    ObjectName::new("shop", name)
}

#[test]
fn test_second_backup_times_out() {
    let env = TestEnv::with_config(|config| config.with_lock_wait_timeout(100));
    let c = &env.coordinator;
    let mut first = c.new_session();
    let mut second = c.new_session();

    c.run_stage(&mut first, BackupStage::Start).unwrap();
    let err = c.run_stage(&mut second, BackupStage::Start).unwrap_err();
    assert_eq!(err.failed_stage(), Some(BackupStage::Start));
    assert!(matches!(
        err,
        QuiesceError::StageFailed { ref source, .. } if source.is_lock_timeout()
    ));
    assert_eq!(second.backup_stage(), BackupStage::Finished);
    assert_eq!(c.status().owner, Some(first.id()));

    c.run_stage(&mut first, BackupStage::End).unwrap();
    c.run_stage(&mut second, BackupStage::Start).unwrap();
    assert_eq!(c.status().owner, Some(second.id()));
    c.run_stage(&mut second, BackupStage::End).unwrap();
}

#[test]
fn test_racing_starts_have_one_winner() {
    let env = TestEnv::with_config(|config| config.with_lock_wait_timeout(200));
    let n = 8;
    let barrier = Arc::new(Barrier::new(n));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let c = Arc::clone(&env.coordinator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut s = c.new_session();
                barrier.wait();
                let won = c.run_stage(&mut s, BackupStage::Start).is_ok();
                // Hold the backup past every loser's timeout
                thread::sleep(Duration::from_millis(400));
                (won, s)
            })
        })
        .collect();

    let mut sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = sessions.iter().filter(|(won, _)| *won).count();
    assert_eq!(winners, 1);

    for (_, s) in sessions.iter_mut() {
        env.coordinator.run_stage(s, BackupStage::End).ok();
    }
    assert_eq!(env.locks.granted_count(), 0);
}

#[test]
fn test_flush_blocks_new_nontransactional_writes_only() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    let mut running = c.new_session();
    let mut trans = c.new_session();

    c.begin_statement(&mut running, StatementClass::NonTransactionalWrite, &[table("log")])
        .unwrap();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    // Does not wait for the running write
    c.run_stage(&mut backup, BackupStage::Flush).unwrap();

    let mut late = c.new_session();
    let late_id = late.id();
    let c2 = Arc::clone(&c);
    let late_writer = thread::spawn(move || {
        let res = c2.begin_statement(&mut late, StatementClass::NonTransactionalWrite, &[table("log")]);
        c2.end_statement(&mut late);
        res
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(late_id)));

    // Transactional writes are not affected
    c.begin_statement(&mut trans, StatementClass::TransactionalWrite, &[table("orders")])
        .unwrap();
    c.end_statement(&mut trans);

    c.end_statement(&mut running);
    thread::sleep(Duration::from_millis(50));
    assert!(env.locks.is_waiting(late_id));

    c.run_stage(&mut backup, BackupStage::End).unwrap();
    late_writer.join().unwrap().unwrap();
}

#[test]
fn test_wait_flush_drains_running_nontransactional_writes() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    let backup_id = backup.id();
    let mut writer = c.new_session();

    c.begin_statement(&mut writer, StatementClass::NonTransactionalWrite, &[table("log")])
        .unwrap();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();

    let c2 = Arc::clone(&c);
    let escalation = thread::spawn(move || {
        let res = c2.run_stage(&mut backup, BackupStage::BlockDdl);
        (res, backup)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(backup_id)));

    c.end_statement(&mut writer);
    let (res, mut backup) = escalation.join().unwrap();
    res.unwrap();
    assert_eq!(env.backup_level(), Some(LockMode::BackupBlockDdl));
    c.run_stage(&mut backup, BackupStage::End).unwrap();
}

#[test]
fn test_block_ddl_drains_running_ddl_and_blocks_new_ddl() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    let backup_id = backup.id();
    let mut ddl = c.new_session();

    c.begin_statement(&mut ddl, StatementClass::Ddl, &[table("orders")])
        .unwrap();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::Flush).unwrap();

    let c2 = Arc::clone(&c);
    let escalation = thread::spawn(move || {
        let res = c2.run_stage(&mut backup, BackupStage::BlockDdl);
        (res, backup)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(backup_id)));
    c.end_statement(&mut ddl);
    let (res, mut backup) = escalation.join().unwrap();
    res.unwrap();

    // New DDL waits until END
    let c3 = Arc::clone(&c);
    let mut late = c.new_session();
    let late_id = late.id();
    let late_ddl = thread::spawn(move || {
        let res = c3.begin_statement(&mut late, StatementClass::Ddl, &[table("items")]);
        c3.end_statement(&mut late);
        res
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(late_id)));

    // Transactional writes still go through at BLOCK_DDL
    let mut writer = c.new_session();
    c.begin_statement(&mut writer, StatementClass::TransactionalWrite, &[table("orders")])
        .unwrap();
    c.end_statement(&mut writer);

    c.run_stage(&mut backup, BackupStage::End).unwrap();
    late_ddl.join().unwrap().unwrap();
}

#[test]
fn test_waiting_block_ddl_is_not_overtaken_by_new_ddl() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    let backup_id = backup.id();
    let mut first = c.new_session();

    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::Flush).unwrap();
    c.begin_statement(&mut first, StatementClass::Ddl, &[table("orders")])
        .unwrap();

    let c2 = Arc::clone(&c);
    let escalation = thread::spawn(move || {
        let res = c2.run_stage(&mut backup, BackupStage::BlockDdl);
        (res, backup)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(backup_id)));

    // A second DDL arriving now must not slip in ahead of BLOCK_DDL
    let mut second = c.new_session();
    let second_id = second.id();
    let c3 = Arc::clone(&c);
    let second_ddl = thread::spawn(move || {
        let res = c3.begin_statement(&mut second, StatementClass::Ddl, &[table("items")]);
        c3.end_statement(&mut second);
        res
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(second_id)));

    // Once the first DDL finishes, the backup gets its level
    c.end_statement(&mut first);
    let (res, mut backup) = escalation.join().unwrap();
    res.unwrap();
    assert_eq!(env.backup_level(), Some(LockMode::BackupBlockDdl));

    thread::sleep(Duration::from_millis(30));
    assert!(env.locks.is_waiting(second_id));

    c.run_stage(&mut backup, BackupStage::End).unwrap();
    second_ddl.join().unwrap().unwrap();
}

/// A statement-duration `Ddl` lock that gives up after 50ms.
fn short_ddl(locks: &LockManager, owner: u64, kill: &KillFlag) -> Result<TicketId> {
    let waiter = LockWaiter {
        owner: SessionId(owner),
        kill,
        timeout: Duration::from_millis(50),
    };
    locks.acquire(&LockRequest::backup(LockMode::Ddl, LockDuration::Statement), &waiter)
}

#[test]
fn test_relay_of_short_ddl_cannot_starve_block_ddl() {
    let env = TestEnv::with_config(|config| config.with_lock_wait_timeout(1_500));
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    let backup_id = backup.id();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::Flush).unwrap();

    let kill = KillFlag::new();
    let first = short_ddl(&env.locks, 1_000, &kill).unwrap();

    let c2 = Arc::clone(&c);
    let escalation = thread::spawn(move || {
        let res = c2.run_stage(&mut backup, BackupStage::BlockDdl);
        (res, backup)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(backup_id)));

    // Each new DDL starts before the previous one ends, so some DDL is
    // always running unless new ones queue behind the backup.
    let locks = Arc::clone(&env.locks);
    let relay = thread::spawn(move || {
        let kill = KillFlag::new();
        let mut held = first;
        let mut granted = 0;
        for owner in 1_001..1_040 {
            thread::sleep(Duration::from_millis(50));
            let next = short_ddl(&locks, owner, &kill);
            locks.release(held);
            match next {
                Ok(ticket) => {
                    granted += 1;
                    held = ticket;
                }
                Err(_) => return granted,
            }
        }
        locks.release(held);
        granted
    });

    let granted = relay.join().unwrap();
    let (res, mut backup) = escalation.join().unwrap();
    res.unwrap();
    assert_eq!(granted, 0);
    assert_eq!(env.backup_level(), Some(LockMode::BackupBlockDdl));
    c.run_stage(&mut backup, BackupStage::End).unwrap();
}

#[test]
fn test_waiting_block_commit_is_not_overtaken_by_new_commits() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    let backup_id = backup.id();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::BlockDdl).unwrap();

    let running = c.new_session();
    let kill = running.kill_flag();
    let waiter = LockWaiter {
        owner: running.id(),
        kill: &kill,
        timeout: Duration::from_secs(1),
    };
    let commit = c
        .locks()
        .acquire(&LockRequest::backup(LockMode::Commit, LockDuration::Transaction), &waiter)
        .unwrap();

    let c2 = Arc::clone(&c);
    let escalation = thread::spawn(move || {
        let res = c2.run_stage(&mut backup, BackupStage::BlockCommit);
        (res, backup)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(backup_id)));

    let mut txn = c.new_session();
    let txn_id = txn.id();
    txn.set_in_transaction(true);
    let c3 = Arc::clone(&c);
    let committer = thread::spawn(move || {
        let res = c3.commit(&mut txn);
        (res, txn)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(txn_id)));

    c.locks().release(commit);
    let (res, mut backup) = escalation.join().unwrap();
    res.unwrap();
    assert!(env.locks.is_waiting(txn_id));

    c.run_stage(&mut backup, BackupStage::End).unwrap();
    let (res, txn) = committer.join().unwrap();
    res.unwrap();
    assert!(!txn.in_transaction());
}

#[test]
fn test_block_commit_blocks_commits_until_end() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::BlockCommit).unwrap();

    let mut txn = c.new_session();
    let txn_id = txn.id();
    txn.set_in_transaction(true);
    // Transactional DML is still allowed, only the commit waits
    c.begin_statement(&mut txn, StatementClass::TransactionalWrite, &[table("orders")])
        .unwrap();
    c.end_statement(&mut txn);

    let c2 = Arc::clone(&c);
    let committer = thread::spawn(move || {
        let res = c2.commit(&mut txn);
        (res, txn)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(txn_id)));
    thread::sleep(Duration::from_millis(30));
    assert!(env.locks.is_waiting(txn_id));

    c.run_stage(&mut backup, BackupStage::End).unwrap();
    let (res, txn) = committer.join().unwrap();
    res.unwrap();
    assert!(!txn.in_transaction());
}

#[test]
fn test_commits_flow_before_block_commit() {
    let env = TestEnv::new();
    let c = &env.coordinator;
    let mut backup = c.new_session();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::BlockDdl).unwrap();

    let mut txn = c.new_session();
    txn.set_in_transaction(true);
    c.commit(&mut txn).unwrap();
    c.run_stage(&mut backup, BackupStage::End).unwrap();
}

#[test]
fn test_block_commit_waits_for_running_commit() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    let backup_id = backup.id();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::BlockDdl).unwrap();

    // A commit in progress, held open through the lock service
    let committer = c.new_session();
    let kill = committer.kill_flag();
    let waiter = LockWaiter {
        owner: committer.id(),
        kill: &kill,
        timeout: Duration::from_secs(1),
    };
    let commit = c
        .locks()
        .acquire(&LockRequest::backup(LockMode::Commit, LockDuration::Transaction), &waiter)
        .unwrap();

    let c2 = Arc::clone(&c);
    let escalation = thread::spawn(move || {
        let res = c2.run_stage(&mut backup, BackupStage::BlockCommit);
        (res, backup)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(backup_id)));
    c.locks().release(commit);

    let (res, mut backup) = escalation.join().unwrap();
    res.unwrap();
    c.run_stage(&mut backup, BackupStage::End).unwrap();
}

#[test]
fn test_kill_interrupts_blocked_statement() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::BlockDdl).unwrap();

    let mut ddl = c.new_session();
    let ddl_id = ddl.id();
    let kill = ddl.kill_flag();
    let c2 = Arc::clone(&c);
    let handle = thread::spawn(move || {
        let res = c2.begin_statement(&mut ddl, StatementClass::Ddl, &[table("orders")]);
        (res, ddl)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(ddl_id)));

    let killed_at = Instant::now();
    kill.kill();
    let (res, ddl) = handle.join().unwrap();
    assert!(killed_at.elapsed() < Duration::from_secs(1));
    assert!(matches!(res, Err(QuiesceError::Killed)));
    assert!(ddl.statement_ticket().is_none());
    c.run_stage(&mut backup, BackupStage::End).unwrap();
}

#[test]
fn test_kill_interrupts_escalation() {
    let env = TestEnv::new();
    let c = Arc::clone(&env.coordinator);
    let mut ddl = c.new_session();
    c.begin_statement(&mut ddl, StatementClass::Ddl, &[table("orders")])
        .unwrap();

    let mut backup = c.new_session();
    let backup_id = backup.id();
    let kill = backup.kill_flag();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::Flush).unwrap();

    let c2 = Arc::clone(&c);
    let escalation = thread::spawn(move || {
        let res = c2.run_stage(&mut backup, BackupStage::BlockDdl);
        (res, backup)
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(backup_id)));
    kill.kill();

    let (res, mut backup) = escalation.join().unwrap();
    let err = res.unwrap_err();
    assert_eq!(err.failed_stage(), Some(BackupStage::BlockDdl));
    assert!(matches!(
        err,
        QuiesceError::StageFailed { ref source, .. } if matches!(**source, QuiesceError::Killed)
    ));
    assert_eq!(backup.backup_stage(), BackupStage::Flush);
    assert_eq!(env.backup_level(), Some(LockMode::BackupFlush));

    kill.reset();
    c.end_statement(&mut ddl);
    c.run_stage(&mut backup, BackupStage::End).unwrap();
    assert_eq!(env.locks.granted_count(), 0);
}

#[test]
fn test_real_deadlock_is_retried_until_it_clears() {
    let env = TestEnv::with_config(|config| {
        config.with_block_ddl_retry(RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 20,
            multiplier: 3,
        })
    });
    let c = Arc::clone(&env.coordinator);
    let mut backup = c.new_session();
    c.run_stage(&mut backup, BackupStage::Start).unwrap();
    c.run_stage(&mut backup, BackupStage::Flush).unwrap();

    // Session X runs DDL and then needs a non-transactional write, which
    // FLUSH holds off: X waits on the backup.
    let mut x = c.new_session();
    let x_id = x.id();
    c.begin_statement(&mut x, StatementClass::Ddl, &[table("orders")])
        .unwrap();
    let c2 = Arc::clone(&c);
    let x_thread = thread::spawn(move || {
        let kill = x.kill_flag();
        let waiter = LockWaiter {
            owner: x.id(),
            kill: &kill,
            timeout: Duration::from_millis(300),
        };
        let res = c2
            .locks()
            .acquire(&LockRequest::backup(LockMode::Dml, LockDuration::Statement), &waiter);
        c2.end_statement(&mut x);
        res
    });
    assert!(wait_until(WAIT, || env.locks.is_waiting(x_id)));

    // The backup now waits on X's DDL: a cycle, with the backup as victim.
    // Retries continue until X gives up and releases its DDL lock.
    let started = Instant::now();
    c.run_stage(&mut backup, BackupStage::BlockDdl).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(env.backup_level(), Some(LockMode::BackupBlockDdl));

    let x_res = x_thread.join().unwrap();
    assert!(x_res.unwrap_err().is_lock_timeout());
    c.run_stage(&mut backup, BackupStage::End).unwrap();
}

//! Collaborator doubles shared by the integration tests
#![allow(dead_code)]

use parking_lot::Mutex;
use quiesce::{
    BackupConfig, BackupCoordinator, BinaryLog, FlushScope, GrantedLock, LockKey, LockManager,
    LockMode, LockRequest, LockWaiter, MetadataLocks, QuiesceError, ReplicationCoordinator,
    Result, RetryConfig, SessionId, StorageEngine, TableCache, TicketId,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Ordered record of collaborator calls, shared by all doubles of one test.
#[derive(Default)]
pub struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub struct RecordingEngine {
    name: String,
    log: Arc<CallLog>,
    pub fail_prepare: AtomicBool,
    pub fail_end: AtomicBool,
}

impl RecordingEngine {
    pub fn new(name: &str, log: Arc<CallLog>) -> Self {
        Self {
            name: name.to_string(),
            log,
            fail_prepare: AtomicBool::new(false),
            fail_end: AtomicBool::new(false),
        }
    }
}

impl StorageEngine for RecordingEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare_for_backup(&self) -> Result<()> {
        self.log.push(format!("{}:prepare", self.name));
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(QuiesceError::Engine(format!("{} refused", self.name)));
        }
        Ok(())
    }

    fn end_backup(&self) -> Result<()> {
        self.log.push(format!("{}:end", self.name));
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(QuiesceError::Engine(format!("{} end failed", self.name)));
        }
        Ok(())
    }
}

pub struct RecordingTables {
    log: Arc<CallLog>,
    pub fail_flush: AtomicBool,
    pub fail_delayed_inserts: AtomicBool,
}

impl RecordingTables {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            fail_flush: AtomicBool::new(false),
            fail_delayed_inserts: AtomicBool::new(false),
        }
    }
}

impl TableCache for RecordingTables {
    fn purge_unused(&self) {
        self.log.push("tables:purge");
    }

    fn flush_tables(&self, scope: FlushScope) -> Result<()> {
        self.log.push(format!("tables:flush:{:?}", scope));
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(QuiesceError::Engine("flush failed".into()));
        }
        Ok(())
    }

    fn stop_delayed_inserts(&self) -> Result<()> {
        self.log.push("tables:stop_delayed");
        if self.fail_delayed_inserts.load(Ordering::SeqCst) {
            return Err(QuiesceError::Engine("delayed insert worker stuck".into()));
        }
        Ok(())
    }

    fn close_handler_tables(&self, _session: SessionId) -> Result<()> {
        self.log.push("tables:close_handlers");
        Ok(())
    }
}

pub struct FakeReplication {
    log: Arc<CallLog>,
    pub active: AtomicBool,
    pub fail_desync: AtomicBool,
}

impl FakeReplication {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            active: AtomicBool::new(false),
            fail_desync: AtomicBool::new(false),
        }
    }
}

impl ReplicationCoordinator for FakeReplication {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn desync_and_pause(&self) -> Result<()> {
        self.log.push("repl:desync");
        if self.fail_desync.load(Ordering::SeqCst) {
            return Err(QuiesceError::Replication("desync refused".into()));
        }
        Ok(())
    }

    fn resume_and_resync(&self) -> Result<()> {
        self.log.push("repl:resync");
        Ok(())
    }

    fn wait_for_flow_control(&self) -> Result<()> {
        self.log.push("repl:flow_control");
        Ok(())
    }
}

pub struct FakeBinlog {
    log: Arc<CallLog>,
    pub open: AtomicBool,
    pub fail_sync: AtomicBool,
}

impl FakeBinlog {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            open: AtomicBool::new(true),
            fail_sync: AtomicBool::new(false),
        }
    }
}

impl BinaryLog for FakeBinlog {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn flush_and_sync(&self) -> Result<()> {
        self.log.push("binlog:sync");
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(QuiesceError::BinaryLog("fsync failed".into()));
        }
        Ok(())
    }
}

/// Lock service that reports a deadlock for every upgrade to
/// `BACKUP_BLOCK_DDL`, counting the attempts.
pub struct DeadlockingLocks {
    inner: LockManager,
    pub block_ddl_attempts: AtomicU32,
}

impl DeadlockingLocks {
    pub fn new() -> Self {
        Self {
            inner: LockManager::new(Duration::from_millis(5)),
            block_ddl_attempts: AtomicU32::new(0),
        }
    }
}

impl MetadataLocks for DeadlockingLocks {
    fn acquire(&self, request: &LockRequest, waiter: &LockWaiter<'_>) -> Result<TicketId> {
        self.inner.acquire(request, waiter)
    }

    fn upgrade(&self, ticket: TicketId, mode: LockMode, waiter: &LockWaiter<'_>) -> Result<()> {
        if mode == LockMode::BackupBlockDdl {
            self.block_ddl_attempts.fetch_add(1, Ordering::SeqCst);
            return Err(QuiesceError::Deadlock);
        }
        self.inner.upgrade(ticket, mode, waiter)
    }

    fn downgrade(&self, ticket: TicketId, mode: LockMode) {
        self.inner.downgrade(ticket, mode)
    }

    fn release(&self, ticket: TicketId) {
        self.inner.release(ticket)
    }

    fn mode_of(&self, ticket: TicketId) -> Option<LockMode> {
        self.inner.mode_of(ticket)
    }

    fn granted(&self, key: &LockKey) -> Vec<GrantedLock> {
        self.inner.granted(key)
    }
}

/// Retry schedule that keeps tests fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        initial_backoff_ms: 1,
        multiplier: 2,
    }
}

pub fn test_config(dir: &TempDir) -> BackupConfig {
    BackupConfig::new(dir.path())
        .with_lock_wait_timeout(2_000)
        .with_block_ddl_retry(fast_retry())
        .with_kill_poll_interval(5)
}

/// A coordinator wired to recording doubles.
pub struct TestEnv {
    pub coordinator: Arc<BackupCoordinator>,
    pub locks: Arc<LockManager>,
    pub calls: Arc<CallLog>,
    pub innodb: Arc<RecordingEngine>,
    pub aria: Arc<RecordingEngine>,
    pub tables: Arc<RecordingTables>,
    pub replication: Arc<FakeReplication>,
    pub binlog: Arc<FakeBinlog>,
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    pub fn with_config(adjust: impl FnOnce(BackupConfig) -> BackupConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = adjust(test_config(&dir));
        let calls = Arc::new(CallLog::default());
        let locks = Arc::new(LockManager::new(config.kill_poll_interval()));
        let innodb = Arc::new(RecordingEngine::new("InnoDB", Arc::clone(&calls)));
        let aria = Arc::new(RecordingEngine::new("Aria", Arc::clone(&calls)));
        let tables = Arc::new(RecordingTables::new(Arc::clone(&calls)));
        let replication = Arc::new(FakeReplication::new(Arc::clone(&calls)));
        let binlog = Arc::new(FakeBinlog::new(Arc::clone(&calls)));

        let coordinator = BackupCoordinator::builder(config)
            .with_lock_service(locks.clone())
            .with_engine(innodb.clone())
            .with_engine(aria.clone())
            .with_table_cache(tables.clone())
            .with_replication(replication.clone())
            .with_binary_log(binlog.clone())
            .build()
            .unwrap();

        Self {
            coordinator: Arc::new(coordinator),
            locks,
            calls,
            innodb,
            aria,
            tables,
            replication,
            binlog,
            dir,
        }
    }

    /// Level currently held by the escalation ticket.
    pub fn backup_level(&self) -> Option<LockMode> {
        self.coordinator.status().level
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

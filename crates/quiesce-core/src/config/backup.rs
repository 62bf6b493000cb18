use crate::error::{QuiesceError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry schedule for the BLOCK_DDL escalation.
///
/// Only deadlock failures are retried. The sleep before retry `n` (0-based)
/// is `initial_backoff_ms * multiplier^n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sleep before the first retry in milliseconds (default: 100)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Factor applied to the sleep after every retry (default: 5)
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Sleep before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(retry);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    /// Sum of every sleep the schedule can take.
    pub fn worst_case_sleep(&self) -> Duration {
        (0..self.max_retries).map(|retry| self.backoff(retry)).sum()
    }
}

/// What to do when a best-effort table flush fails during BLOCK_DDL or
/// BLOCK_COMMIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlushFailurePolicy {
    /// Log and count the failure, never fail the stage (default).
    #[default]
    Ignore,

    /// Fail the stage once more than this many flush failures have been
    /// seen during the current backup.
    FailAfter(u32),
}

impl FlushFailurePolicy {
    /// Whether `failures` ignored failures is still acceptable.
    pub fn tolerates(self, failures: u64) -> bool {
        match self {
            FlushFailurePolicy::Ignore => true,
            FlushFailurePolicy::FailAfter(limit) => failures <= u64::from(limit),
        }
    }
}

/// Configuration for the backup coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// File the DDL audit log is written to while a backup runs
    pub ddl_log_path: PathBuf,

    /// Lock wait timeout in milliseconds (default: one year)
    ///
    /// Applies to every acquisition and upgrade the protocol makes.
    #[serde(default = "default_lock_wait_timeout")]
    pub lock_wait_timeout_ms: u64,

    /// Retry schedule for deadlocks hit while escalating to BLOCK_DDL
    #[serde(default)]
    pub block_ddl_retry: RetryConfig,

    /// Desync this node from replication during BLOCK_DDL (default: true)
    ///
    /// Has no effect when no replication layer is active.
    #[serde(default = "default_true")]
    pub replication_desync: bool,

    /// Policy for failed best-effort flushes
    #[serde(default)]
    pub flush_failure_policy: FlushFailurePolicy,

    /// How often a blocked lock wait re-checks its kill flag (default: 10ms)
    #[serde(default = "default_kill_poll_interval")]
    pub kill_poll_interval_ms: u64,
}

fn default_lock_wait_timeout() -> u64 {
    365 * 24 * 60 * 60 * 1000
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_multiplier() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_kill_poll_interval() -> u64 {
    10
}

impl BackupConfig {
    /// Configuration with the DDL audit log at `<data_dir>/ddl.log`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            ddl_log_path: data_dir.as_ref().join("ddl.log"),
            lock_wait_timeout_ms: default_lock_wait_timeout(),
            block_ddl_retry: RetryConfig::default(),
            replication_desync: default_true(),
            flush_failure_policy: FlushFailurePolicy::default(),
            kill_poll_interval_ms: default_kill_poll_interval(),
        }
    }

    /// Load a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: BackupConfig = serde_json::from_str(&data).map_err(|e| {
            QuiesceError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ddl_log_path.as_os_str().is_empty() {
            return Err(QuiesceError::Config("ddl_log_path must not be empty".into()));
        }
        if self.block_ddl_retry.multiplier == 0 {
            return Err(QuiesceError::Config(
                "block_ddl_retry.multiplier must be positive".into(),
            ));
        }
        if self.kill_poll_interval_ms == 0 {
            return Err(QuiesceError::Config(
                "kill_poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    pub fn kill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.kill_poll_interval_ms)
    }

    pub fn with_ddl_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ddl_log_path = path.into();
        self
    }

    /// Set the lock wait timeout in milliseconds
    pub fn with_lock_wait_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_wait_timeout_ms = timeout_ms;
        self
    }

    pub fn with_block_ddl_retry(mut self, retry: RetryConfig) -> Self {
        self.block_ddl_retry = retry;
        self
    }

    pub fn with_replication_desync(mut self, enabled: bool) -> Self {
        self.replication_desync = enabled;
        self
    }

    pub fn with_flush_failure_policy(mut self, policy: FlushFailurePolicy) -> Self {
        self.flush_failure_policy = policy;
        self
    }

    pub fn with_kill_poll_interval(mut self, interval_ms: u64) -> Self {
        self.kill_poll_interval_ms = interval_ms;
        self
    }
}

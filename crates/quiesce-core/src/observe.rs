//! Optional metrics instrumentation for quiesce.
//!
//! When the `observe` feature is enabled, stage transitions, lock waits and
//! audit log writes emit counters and histograms via the [`metrics`] crate.
//! A downstream application must install a metrics recorder to collect them.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

use crate::types::BackupStage;

/// Record the outcome of one `BACKUP STAGE` request.
///
/// - `quiesce.stage.requests_total` – counter with `stage` and `outcome` labels
/// - `quiesce.stage.duration_seconds` – histogram with `stage` label
#[inline]
pub fn record_stage(stage: BackupStage, duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!(
            "quiesce.stage.requests_total",
            "stage" => stage.name(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("quiesce.stage.duration_seconds", "stage" => stage.name())
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (stage, duration, success);
    }
}

/// Record time spent blocked in the lock manager.
///
/// - `quiesce.lock.wait_seconds` – histogram
#[inline]
pub fn record_lock_wait(duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::histogram!("quiesce.lock.wait_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}

/// Record a deadlock retry while escalating to BLOCK_DDL.
///
/// - `quiesce.block_ddl.retries_total` – counter
#[inline]
pub fn record_block_ddl_retry() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quiesce.block_ddl.retries_total").increment(1);
    }
}

/// Record a best-effort operation that failed and was ignored.
///
/// - `quiesce.best_effort.failures_total` – counter with `operation` label
#[inline]
pub fn record_ignored_failure(operation: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quiesce.best_effort.failures_total", "operation" => operation)
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = operation;
    }
}

/// Record an audit log write.
///
/// - `quiesce.ddl_log.records_total` – counter with `outcome` label
#[inline]
pub fn record_ddl_log_write(success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("quiesce.ddl_log.records_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = success;
    }
}

/// Set whether a backup currently holds the escalation ticket.
///
/// - `quiesce.backup.active` – gauge (0 or 1)
#[inline]
pub fn set_backup_active(active: bool) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("quiesce.backup.active").set(if active { 1.0 } else { 0.0 });
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = active;
    }
}

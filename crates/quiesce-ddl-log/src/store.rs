use crate::format::DdlLogLine;
use parking_lot::Mutex;
use quiesce_core::{observe, DdlLogRecord, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct LogState {
    file: Option<File>,
    path: Option<PathBuf>,
    /// Sticky: set by the first failed write, cleared by `close`.
    error: bool,
}

/// Audit log of DDL run while a backup is in progress
///
/// Opened by BACKUP STAGE START and closed by BACKUP STAGE END. `log` is
/// called from statement execution on arbitrary sessions and never fails:
/// when the log is closed or a previous write failed, the record is dropped.
#[derive(Debug, Default)]
pub struct DdlLog {
    state: Mutex<LogState>,
    /// Open and not errored; read without the mutex on the hot path.
    accepting: AtomicBool,
}

impl DdlLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or truncate) the log file and start accepting records.
    ///
    /// A log that is already open is closed first.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if let Some(old) = state.file.take() {
            let _ = old.sync_data();
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        state.file = Some(file);
        state.path = Some(path.to_path_buf());
        state.error = false;
        self.accepting.store(true, Ordering::Release);
        tracing::debug!("Opened DDL log {}", path.display());
        Ok(())
    }

    /// Stop logging and close the file. Clears the error flag.
    pub fn close(&self) {
        let mut state = self.state.lock();
        self.accepting.store(false, Ordering::Release);
        if let Some(file) = state.file.take() {
            if let Err(e) = file.sync_data() {
                tracing::warn!("Failed to sync DDL log on close: {}", e);
            }
        }
        if state.error {
            tracing::warn!("DDL log closed after a write failure; records were dropped");
        }
        state.error = false;
        state.path = None;
    }

    /// Append one record.
    pub fn log(&self, record: &DdlLogRecord) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }

        let mut state = self.state.lock();
        if state.error {
            return;
        }
        let Some(file) = state.file.as_mut() else {
            return;
        };

        let mut line = DdlLogLine(record).to_string();
        line.push('\n');
        match file.write_all(line.as_bytes()) {
            Ok(()) => observe::record_ddl_log_write(true),
            Err(e) => {
                tracing::warn!("DDL log write failed, further records are dropped: {}", e);
                state.error = true;
                self.accepting.store(false, Ordering::Release);
                observe::record_ddl_log_write(false);
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    /// Whether a write has failed since the log was opened.
    pub fn has_error(&self) -> bool {
        self.state.lock().error
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.state.lock().path.clone()
    }
}

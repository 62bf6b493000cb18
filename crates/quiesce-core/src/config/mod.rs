pub mod backup;

pub use backup::{BackupConfig, FlushFailurePolicy, RetryConfig};

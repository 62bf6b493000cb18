use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One side (source or target) of a logged DDL statement.
///
/// Empty strings and `None` mean "not applicable"; a `CREATE` has no target,
/// for example.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlObjectInfo {
    pub engine: String,
    pub partitioned: bool,
    pub database: String,
    pub table: String,
    pub id: Option<Uuid>,
}

impl DdlObjectInfo {
    pub fn new(
        engine: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            engine: engine.into(),
            partitioned: false,
            database: database.into(),
            table: table.into(),
            id: None,
        }
    }

    pub fn with_partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// DDL statement observed while a backup is running.
///
/// Built by the statement execution path and handed to the audit log, which
/// the external backup tool replays against the files it copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlLogRecord {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub source: DdlObjectInfo,
    pub target: DdlObjectInfo,
}

impl DdlLogRecord {
    /// A record stamped with the current time and no target.
    pub fn new(query: impl Into<String>, source: DdlObjectInfo) -> Self {
        Self {
            timestamp: Utc::now(),
            query: query.into(),
            source,
            target: DdlObjectInfo::default(),
        }
    }

    pub fn with_target(mut self, target: DdlObjectInfo) -> Self {
        self.target = target;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

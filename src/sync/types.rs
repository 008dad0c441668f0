//! Sync types
//!
//! Collaborator traits, output messages and statistics for a sync run.

use crate::error::Result;
use crate::types::Record;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Persistent bookmark storage
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Stored bookmark of `field` for `stream`
    async fn get_bookmark(&self, stream: &str, field: &str) -> Option<Value>;

    /// Record a new bookmark
    async fn set_bookmark(&self, stream: &str, field: &str, value: Value) -> Result<()>;

    /// Persist the current state and return it
    async fn checkpoint(&self) -> Result<Value>;
}

/// Destination of records and state, in emission order
pub trait RecordSink: Send {
    fn write_record(&mut self, stream: &str, record: &Record) -> Result<()>;

    fn write_state(&mut self, state: &Value) -> Result<()>;
}

/// A line of sync output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message<'a> {
    Record { stream: &'a str, record: &'a Record },
    State { value: &'a Value },
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records written to the sink
    pub records_synced: u64,
    /// Records at or before the bookmark, or without a replication value
    pub records_skipped: u64,
    /// Streams synced to completion
    pub streams_synced: usize,
    /// State messages written
    pub checkpoints: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&mut self) {
        self.records_synced += 1;
    }

    pub fn skip_record(&mut self) {
        self.records_skipped += 1;
    }

    /// Fold in the stats of another stream
    pub fn merge(&mut self, other: &SyncStats) {
        self.records_synced += other.records_synced;
        self.records_skipped += other.records_skipped;
        self.streams_synced += other.streams_synced;
        self.checkpoints += other.checkpoints;
        self.duration_ms += other.duration_ms;
    }
}

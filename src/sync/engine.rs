//! Stream syncer
//!
//! Drives record streams from the client into a sink, tracking bookmarks
//! and emitting state checkpoints.

use super::streams::{self, StreamDefinition, STREAMS};
use super::types::{RecordSink, StateStore, SyncStats};
use crate::client::BigCommerceClient;
use crate::error::{Error, Result};
use crate::transform::{format_datetime, parse_datetime};
use crate::types::{Record, ReplicationMethod};
use futures::StreamExt;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Syncs streams from a client into a sink
pub struct StreamSyncer<'a> {
    client: &'a BigCommerceClient,
    state: &'a dyn StateStore,
    checkpoint_every: u64,
}

impl<'a> StreamSyncer<'a> {
    /// Create a syncer using the client's checkpoint interval
    pub fn new(client: &'a BigCommerceClient, state: &'a dyn StateStore) -> Self {
        Self {
            client,
            state,
            checkpoint_every: client.config().checkpoint_every.max(1),
        }
    }

    /// Emit state every `every` written records
    #[must_use]
    pub fn with_checkpoint_every(mut self, every: u64) -> Self {
        self.checkpoint_every = every.max(1);
        self
    }

    /// Sync the named streams in order, or every stream when `names` is empty
    ///
    /// Unknown names are rejected before anything is fetched.
    pub async fn sync_all(&self, names: &[String], sink: &mut dyn RecordSink) -> Result<SyncStats> {
        let selected: Vec<&'static StreamDefinition> = if names.is_empty() {
            STREAMS.iter().collect()
        } else {
            names
                .iter()
                .map(|name| {
                    streams::stream(name).ok_or_else(|| Error::StreamNotFound {
                        stream: name.clone(),
                    })
                })
                .collect::<Result<_>>()?
        };

        let mut total = SyncStats::new();
        for definition in selected {
            let stats = self.sync_stream(definition, sink).await?;
            total.merge(&stats);
        }

        info!(
            streams = total.streams_synced,
            records = total.records_synced,
            skipped = total.records_skipped,
            duration_ms = total.duration_ms,
            "sync complete"
        );
        Ok(total)
    }

    /// Sync one stream to completion
    ///
    /// State is checkpointed at the end of the stream even when it fails.
    pub async fn sync_stream(
        &self,
        definition: &StreamDefinition,
        sink: &mut dyn RecordSink,
    ) -> Result<SyncStats> {
        definition.validate()?;
        let started = Instant::now();
        let mut stats = SyncStats::new();

        info!(
            stream = definition.name,
            method = ?definition.replication_method,
            "syncing stream"
        );

        let outcome = match definition.replication_method {
            ReplicationMethod::Incremental => {
                self.sync_incremental(definition, sink, &mut stats).await
            }
            ReplicationMethod::FullTable => self.sync_full_table(definition, sink, &mut stats).await,
        };
        let checkpoint = self.checkpoint(sink, &mut stats).await;

        if let Err(e) = &outcome {
            warn!(stream = definition.name, error = %e, "stream failed after {} records", stats.records_synced);
        }
        outcome?;
        checkpoint?;

        stats.streams_synced = 1;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            stream = definition.name,
            records = stats.records_synced,
            skipped = stats.records_skipped,
            duration_ms = stats.duration_ms,
            "stream synced"
        );
        Ok(stats)
    }

    async fn sync_incremental(
        &self,
        definition: &StreamDefinition,
        sink: &mut dyn RecordSink,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let key = definition.replication_key.ok_or_else(|| {
            Error::config(format!("stream '{}' has no replication key", definition.name))
        })?;

        let start_value = match self.state.get_bookmark(definition.name, key).await {
            Some(value) => value,
            None => Value::String(format_datetime(self.client.config().start_date()?)),
        };
        let since = start_value.as_str().and_then(parse_datetime);
        debug!(stream = definition.name, bookmark = %start_value, "starting from bookmark");

        // A bookmark is only committed once every row before it has been
        // written: per record on sorted streams, per drained window otherwise.
        let windows = self.client.record_windows(definition.name, since)?;
        let mut committed: Option<Value> = None;

        for mut records in windows {
            let mut window_max: Option<Value> = None;

            while let Some(record) = records.next().await {
                let record = record?;

                let value = match record.get(key) {
                    Some(value) if !value.is_null() => value.clone(),
                    _ => {
                        warn!(stream = definition.name, key, "record has no replication value, skipping");
                        stats.skip_record();
                        continue;
                    }
                };
                if !is_newer(&value, &start_value) {
                    stats.skip_record();
                    continue;
                }

                self.write(definition, &record, sink, stats).await?;

                if window_max.as_ref().map_or(true, |max| is_newer(&value, max)) {
                    window_max = Some(value);
                }
                if definition.sorted_by_key {
                    if let Some(max) = &window_max {
                        self.commit(definition, key, &mut committed, max.clone()).await?;
                    }
                }
            }

            if let Some(max) = window_max {
                self.commit(definition, key, &mut committed, max).await?;
            }
        }

        Ok(())
    }

    /// Store `value` unless a later bookmark was already stored this run
    async fn commit(
        &self,
        definition: &StreamDefinition,
        key: &str,
        committed: &mut Option<Value>,
        value: Value,
    ) -> Result<()> {
        if committed.as_ref().is_some_and(|current| !is_newer(&value, current)) {
            return Ok(());
        }
        self.state.set_bookmark(definition.name, key, value.clone()).await?;
        *committed = Some(value);
        Ok(())
    }

    async fn sync_full_table(
        &self,
        definition: &StreamDefinition,
        sink: &mut dyn RecordSink,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let mut records = self.client.records(definition.name, None)?;
        while let Some(record) = records.next().await {
            let record = record?;
            self.write(definition, &record, sink, stats).await?;
        }
        Ok(())
    }

    async fn write(
        &self,
        definition: &StreamDefinition,
        record: &Record,
        sink: &mut dyn RecordSink,
        stats: &mut SyncStats,
    ) -> Result<()> {
        sink.write_record(definition.name, record)?;
        stats.add_record();
        if stats.records_synced % self.checkpoint_every == 0 {
            self.checkpoint(sink, stats).await?;
        }
        Ok(())
    }

    async fn checkpoint(&self, sink: &mut dyn RecordSink, stats: &mut SyncStats) -> Result<()> {
        let state = self.state.checkpoint().await?;
        sink.write_state(&state)?;
        stats.checkpoints += 1;
        Ok(())
    }
}

/// Whether a replication value is strictly past `bookmark`
///
/// Dates compare as instants and numbers numerically. Anything else falls
/// back to comparing the JSON text.
pub fn is_newer(value: &Value, bookmark: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_instant(value), as_instant(bookmark)) {
        return a > b;
    }
    if let (Some(a), Some(b)) = (as_number(value), as_number(bookmark)) {
        return a > b;
    }
    value.to_string() > bookmark.to_string()
}

fn as_instant(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    value.as_str().and_then(parse_datetime)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

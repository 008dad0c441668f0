//! Sync module
//!
//! Replicates streams into a record sink.
//!
//! # Overview
//!
//! The sync module provides:
//! - `STREAMS` - The stream table with replication settings
//! - `StreamSyncer` - Per-stream bookmark tracking and checkpointing
//! - `JsonLinesSink` - RECORD and STATE messages, one per line
//! - `StateStore` and `RecordSink` - Seams for persistence and output

mod engine;
mod sink;
mod streams;
mod types;

pub use engine::{is_newer, StreamSyncer};
pub use sink::JsonLinesSink;
pub use streams::{stream, StreamDefinition, STREAMS, VALID_REPLICATION_KEYS};
pub use types::{Message, RecordSink, StateStore, SyncStats};

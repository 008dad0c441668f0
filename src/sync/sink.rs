//! JSON-lines output

use super::types::{Message, RecordSink};
use crate::error::{Error, Result};
use crate::types::Record;
use serde_json::Value;
use std::io::Write;

/// Writes one JSON message per line
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_message(&mut self, message: &Message<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, message)
            .map_err(|e| Error::sink(format!("Failed to serialize message: {e}")))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| Error::sink(format!("Failed to write message: {e}")))
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write_record(&mut self, stream: &str, record: &Record) -> Result<()> {
        self.write_message(&Message::Record { stream, record })
    }

    /// State lines are flushed so a crash never loses an emitted checkpoint
    fn write_state(&mut self, state: &Value) -> Result<()> {
        self.write_message(&Message::State { value: state })?;
        self.writer
            .flush()
            .map_err(|e| Error::sink(format!("Failed to flush output: {e}")))
    }
}
